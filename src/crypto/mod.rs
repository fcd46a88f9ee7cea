// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptography
//!
//! All primitives come from `ring`; encodings use `base64ct`.
//!
//! - `credentials` - salted PBKDF2 password hashes for customers and admins
//! - `channel` - PBKDF2-derived AES-256-GCM tokens for request/response payloads

pub mod channel;
pub mod credentials;

pub use channel::{ChannelError, ReplayGuard, SecureChannel};
pub use credentials::{hash_password, verify_password, PasswordHash};

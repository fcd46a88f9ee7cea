// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Module
//!
//! Identity and access control for commands.
//!
//! ## Flow
//!
//! 1. `login` / `admin_login` verify credentials and issue a session token
//! 2. Each request envelope carries the token as `"session"`
//! 3. The mediator resolves it to a [`Principal`] (anonymous if unknown or
//!    expired)
//! 4. The dispatcher checks [`policy::may`] before running the handler

pub mod policy;
pub mod roles;
pub mod session;

pub use policy::{may, required_access, Access, Target};
pub use roles::{Principal, Role};
pub use session::{SessionStore, SessionSweeper};

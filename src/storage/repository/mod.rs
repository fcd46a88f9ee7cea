// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the redb store.
//!
//! Each repository wraps a [`Scope`](super::Scope): reads work on both
//! snapshots and write transactions, mutations only on a
//! [`WriteScope`](super::WriteScope).

pub mod admins;
pub mod aggregates;
pub mod customers;
pub mod purchases;
pub mod shows;

pub use admins::{AdminRepository, NewAdmin};
pub use aggregates::AggregateRepository;
pub use customers::{CustomerRepository, NewCustomer};
pub use purchases::PurchaseRepository;
pub use shows::{NewShow, ShowRemoval, ShowRepository};

use unicode_normalization::UnicodeNormalization;

/// Index key for usernames and emails: NFKC-normalized and lowercased.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

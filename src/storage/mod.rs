// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent relational storage for EasyFlix on an embedded **redb**
//! database file.
//!
//! ## Transaction Model
//!
//! - Every command runs inside exactly one [`Store::write`] (or
//!   [`Store::read`]) call
//! - A handler error aborts the transaction; nothing it wrote survives
//! - redb serializes writers, so business checks and the writes they guard
//!   cannot interleave with another command
//!
//! ## Table Layout
//!
//! ```text
//! customers / shows / purchases / admins     id -> JSON row
//! customer_usernames / customer_emails       normalized key -> customer id
//! admin_usernames                            normalized key -> admin id
//! library                                    (customer, show) -> acquired_at
//! purchase_pairs                             (customer, show) -> purchase id
//! daily_statistics / daily_financials        YYYY-MM-DD -> JSON row
//! sequences                                  name -> last id
//! ```

pub mod database;
pub mod repository;
pub mod seed;

pub use database::{ReadScope, Scope, Store, StoreError, StoreResult, WriteScope};
pub use repository::{
    AdminRepository, AggregateRepository, CustomerRepository, NewAdmin, NewCustomer, NewShow,
    PurchaseRepository, ShowRemoval, ShowRepository,
};

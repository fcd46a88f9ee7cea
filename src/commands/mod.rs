// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Commands
//!
//! - `registry` - the closed set of operation names
//! - `args` - typed, validated arguments for each operation
//! - `rules` - pure business decisions (pricing, favourites, catalog queries)
//! - `dispatcher` - authorization and transactional execution

pub mod args;
pub mod dispatcher;
pub mod registry;
pub mod rules;

pub use args::Command;
pub use dispatcher::{Caller, Dispatcher, Pricing};
pub use registry::Operation;

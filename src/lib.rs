// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EasyFlix Mediator - Encrypted Command Service
//!
//! The process that owns the EasyFlix database. Customer and admin apps send
//! it sealed command envelopes; it authenticates, authorizes and executes
//! each command in a single transaction and answers with a sealed result.
//!
//! ## Modules
//!
//! - `api` - HTTP transport (Axum)
//! - `auth` - Principals, sessions and the access-control table
//! - `commands` - Operation registry, argument validation, business rules, dispatcher
//! - `aggregation` - Daily statistics and revenue rows
//! - `crypto` - Password hashing and the secure channel
//! - `storage` - redb schema and repositories
//! - `mediator` - Sealed request/response handling
//! - `client` - Protocol client for the customer and admin apps

pub mod aggregation;
pub mod api;
pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mediator;
pub mod models;
pub mod state;
pub mod storage;

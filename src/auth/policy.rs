// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Central access-control table.
//!
//! Every [`Operation`] maps to exactly one [`Access`] level. The dispatcher
//! consults [`may`] once per command, after argument validation and before
//! any state is touched.

use super::Principal;
use crate::commands::Operation;

/// Who may invoke an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, including anonymous callers.
    Public,
    /// Any logged-in customer or admin.
    Authenticated,
    /// Logged-in customers only.
    Customer,
    /// Logged-in admins only.
    Admin,
}

/// The row a command acts on, when it names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    None,
    Customer(u64),
}

pub fn required_access(operation: Operation) -> Access {
    use Operation::*;
    match operation {
        CreateAccount | Login | AdminLogin => Access::Public,

        Logout | ListShows | GetShow | ListGenres | GetPurchaseHistory => Access::Authenticated,

        GetAccount | ChangePassword | ChangeSubscription | SetMarketingOptIn | GetLibrary
        | PurchaseShow | RemoveShowFromLibrary => Access::Customer,

        AdminAddShow | AdminEditShow | AdminDeleteShow | AdminDeleteUser | AdminListUsers
        | AdminGetUser | AdminChangePassword | GetStatistics | GetFinancials => Access::Admin,
    }
}

/// Whether `principal` may run `operation` against `target`.
///
/// Customers may only target their own row; admins may target any.
pub fn may(principal: &Principal, operation: Operation, target: Target) -> bool {
    let role_ok = match required_access(operation) {
        Access::Public => true,
        Access::Authenticated => principal.is_authenticated(),
        Access::Customer => matches!(principal, Principal::Customer { .. }),
        Access::Admin => matches!(principal, Principal::Admin { .. }),
    };
    if !role_ok {
        return false;
    }

    match (principal, target) {
        (_, Target::None) => true,
        (Principal::Admin { .. }, Target::Customer(_)) => true,
        (Principal::Customer { id, .. }, Target::Customer(target_id)) => *id == target_id,
        (Principal::Anonymous, Target::Customer(_)) => false,
    }
}

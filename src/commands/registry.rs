// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The closed set of operations the mediator accepts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Every operation name a request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // Account
    CreateAccount,
    Login,
    AdminLogin,
    Logout,
    GetAccount,
    ChangePassword,
    ChangeSubscription,
    SetMarketingOptIn,
    // Catalog
    ListShows,
    GetShow,
    ListGenres,
    // Library
    GetLibrary,
    PurchaseShow,
    RemoveShowFromLibrary,
    GetPurchaseHistory,
    // Administration
    AdminAddShow,
    AdminEditShow,
    AdminDeleteShow,
    AdminDeleteUser,
    AdminListUsers,
    AdminGetUser,
    AdminChangePassword,
    GetStatistics,
    GetFinancials,
}

impl Operation {
    pub const ALL: [Operation; 24] = [
        Operation::CreateAccount,
        Operation::Login,
        Operation::AdminLogin,
        Operation::Logout,
        Operation::GetAccount,
        Operation::ChangePassword,
        Operation::ChangeSubscription,
        Operation::SetMarketingOptIn,
        Operation::ListShows,
        Operation::GetShow,
        Operation::ListGenres,
        Operation::GetLibrary,
        Operation::PurchaseShow,
        Operation::RemoveShowFromLibrary,
        Operation::GetPurchaseHistory,
        Operation::AdminAddShow,
        Operation::AdminEditShow,
        Operation::AdminDeleteShow,
        Operation::AdminDeleteUser,
        Operation::AdminListUsers,
        Operation::AdminGetUser,
        Operation::AdminChangePassword,
        Operation::GetStatistics,
        Operation::GetFinancials,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::CreateAccount => "create_account",
            Operation::Login => "login",
            Operation::AdminLogin => "admin_login",
            Operation::Logout => "logout",
            Operation::GetAccount => "get_account",
            Operation::ChangePassword => "change_password",
            Operation::ChangeSubscription => "change_subscription",
            Operation::SetMarketingOptIn => "set_marketing_opt_in",
            Operation::ListShows => "list_shows",
            Operation::GetShow => "get_show",
            Operation::ListGenres => "list_genres",
            Operation::GetLibrary => "get_library",
            Operation::PurchaseShow => "purchase_show",
            Operation::RemoveShowFromLibrary => "remove_show_from_library",
            Operation::GetPurchaseHistory => "get_purchase_history",
            Operation::AdminAddShow => "admin_add_show",
            Operation::AdminEditShow => "admin_edit_show",
            Operation::AdminDeleteShow => "admin_delete_show",
            Operation::AdminDeleteUser => "admin_delete_user",
            Operation::AdminListUsers => "admin_list_users",
            Operation::AdminGetUser => "admin_get_user",
            Operation::AdminChangePassword => "admin_change_password",
            Operation::GetStatistics => "get_statistics",
            Operation::GetFinancials => "get_financials",
        }
    }

    /// Look an operation up by its wire name.
    pub fn from_name(name: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Whether the operation only reads state.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Operation::GetAccount
                | Operation::ListShows
                | Operation::GetShow
                | Operation::ListGenres
                | Operation::GetLibrary
                | Operation::GetPurchaseHistory
                | Operation::AdminListUsers
                | Operation::AdminGetUser
                | Operation::GetStatistics
                | Operation::GetFinancials
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

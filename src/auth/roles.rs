// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Roles and the principal a command runs as.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Catalog and user management, statistics and financials
/// - `Customer` - Own account, own library, own purchase history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    /// Parse role from string (case-insensitive).
    /// Used when loading the role column of admin credential rows.
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Customer => write!(f, "customer"),
        }
    }
}

/// The identity a command executes as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Principal {
    /// No session, or an unknown/expired one.
    #[default]
    Anonymous,
    Customer { id: u64, username: String },
    Admin { id: u64, username: String },
}

impl Principal {
    pub fn role(&self) -> Option<Role> {
        match self {
            Principal::Anonymous => None,
            Principal::Customer { .. } => Some(Role::Customer),
            Principal::Admin { .. } => Some(Role::Admin),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Principal::Anonymous)
    }

    pub fn customer_id(&self) -> Option<u64> {
        match self {
            Principal::Customer { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn admin_id(&self) -> Option<u64> {
        match self {
            Principal::Admin { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Short label for logs: `customer:3`, `admin:1`, `anonymous`.
    pub fn label(&self) -> String {
        match self {
            Principal::Anonymous => "anonymous".to_string(),
            Principal::Customer { id, .. } => format!("customer:{id}"),
            Principal::Admin { id, .. } => format!("admin:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("Customer"), Some(Role::Customer));
        assert_eq!(Role::parse("auditor"), None);
    }

    #[test]
    fn principal_accessors() {
        let customer = Principal::Customer {
            id: 4,
            username: "alice".to_string(),
        };
        assert_eq!(customer.role(), Some(Role::Customer));
        assert_eq!(customer.customer_id(), Some(4));
        assert_eq!(customer.admin_id(), None);
        assert_eq!(customer.label(), "customer:4");

        assert!(!Principal::default().is_authenticated());
        assert_eq!(Principal::Anonymous.role(), None);
    }
}

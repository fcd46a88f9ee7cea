// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Data Models
//!
//! Rows persisted by the storage layer and the public views returned to
//! clients. Rows derive `Serialize`/`Deserialize` and are stored as JSON
//! values inside redb tables.
//!
//! ## Money
//!
//! [`Money`] holds integer cents so revenue sums are exact. On the wire it is
//! a decimal number with two fractional digits (`12.5` means 12.50).
//!
//! ## Model Categories
//!
//! - **Principals**: [`Customer`], [`AdminCredential`]
//! - **Catalog**: [`Show`]
//! - **Transactions**: [`Purchase`]
//! - **Aggregates**: [`DailyStatistics`], [`DailyFinancials`]

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

// =============================================================================
// Money
// =============================================================================

/// Monetary amount in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[schema(value_type = f64)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a decimal amount, rounding to the nearest cent.
    ///
    /// Returns `None` for non-finite values or amounts outside the `i64`
    /// cent range.
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_decimal(amount)
            .ok_or_else(|| serde::de::Error::custom("amount must be a finite number"))
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Customer subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SubscriptionLevel {
    Basic,
    Premium,
}

impl fmt::Display for SubscriptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionLevel::Basic => write!(f, "Basic"),
            SubscriptionLevel::Premium => write!(f, "Premium"),
        }
    }
}

/// Which subscription tier a show is included in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AccessGroup {
    Basic,
    Premium,
}

impl fmt::Display for AccessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessGroup::Basic => write!(f, "Basic"),
            AccessGroup::Premium => write!(f, "Premium"),
        }
    }
}

/// Classification rating of a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Rating {
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    M,
    #[serde(rename = "MA15+")]
    Ma15,
    R,
    #[serde(rename = "TV-PG")]
    TvPg,
    #[serde(rename = "TV-14")]
    Tv14,
    #[serde(rename = "TV-MA")]
    TvMa,
}

impl Rating {
    pub const ALL: [Rating; 9] = [
        Rating::G,
        Rating::Pg,
        Rating::Pg13,
        Rating::M,
        Rating::Ma15,
        Rating::R,
        Rating::TvPg,
        Rating::Tv14,
        Rating::TvMa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::G => "G",
            Rating::Pg => "PG",
            Rating::Pg13 => "PG-13",
            Rating::M => "M",
            Rating::Ma15 => "MA15+",
            Rating::R => "R",
            Rating::TvPg => "TV-PG",
            Rating::Tv14 => "TV-14",
            Rating::TvMa => "TV-MA",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Principals
// =============================================================================

/// Administrator login record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminCredential {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Customer account row.
///
/// Owned shows are not stored here; they live in the `library` join table
/// and are attached when building a [`CustomerView`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub subscription_level: SubscriptionLevel,
    pub total_spent: Money,
    pub favourite_genre: Option<String>,
    pub marketing_opt_in: bool,
    pub created_at: DateTime<Utc>,
}

/// Customer as returned to clients (no credential material).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CustomerView {
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub subscription_level: SubscriptionLevel,
    pub total_spent: Money,
    pub favourite_genre: Option<String>,
    pub marketing_opt_in: bool,
    pub owned_show_ids: Vec<u64>,
    pub created_at: DateTime<Utc>,
}

impl CustomerView {
    pub fn new(customer: &Customer, owned_show_ids: Vec<u64>) -> Self {
        Self {
            user_id: customer.id,
            username: customer.username.clone(),
            email: customer.email.clone(),
            subscription_level: customer.subscription_level,
            total_spent: customer.total_spent,
            favourite_genre: customer.favourite_genre.clone(),
            marketing_opt_in: customer.marketing_opt_in,
            owned_show_ids,
            created_at: customer.created_at,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A show in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Show {
    pub id: u64,
    pub name: String,
    pub release_date: NaiveDate,
    pub rating: Rating,
    pub director: String,
    pub length_minutes: u32,
    pub genre: String,
    pub access_group: AccessGroup,
    /// Purchase price for Basic subscribers; `None` for Basic shows.
    pub cost_to_buy: Option<Money>,
}

// =============================================================================
// Transactions
// =============================================================================

/// Record of a Basic customer buying a Premium show.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Purchase {
    pub id: u64,
    pub customer_id: u64,
    pub show_id: u64,
    pub date: NaiveDate,
    pub cost: Money,
}

// =============================================================================
// Aggregates
// =============================================================================

/// Per-day user and subscription counters.
///
/// `total_users`, `total_subscriptions`, `premium_subscriptions` and
/// `basic_subscriptions` are level counters (carried across days);
/// `total_shows_bought` is a flow counter (reset each day).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub total_shows_bought: u64,
    pub total_subscriptions: u64,
    pub premium_subscriptions: u64,
    pub basic_subscriptions: u64,
    pub total_users: u64,
    pub last_updated: DateTime<Utc>,
}

/// Per-day revenue. Every field is a flow counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DailyFinancials {
    pub date: NaiveDate,
    pub revenue_buys: Money,
    pub revenue_subscriptions: Money,
    pub premium_subscription_revenue: Money,
    pub basic_subscription_revenue: Money,
    pub total_combined_revenue: Money,
    pub last_updated: DateTime<Utc>,
}

impl DailyFinancials {
    /// Whether the derived totals agree with their components.
    pub fn is_balanced(&self) -> bool {
        let subscriptions = self
            .premium_subscription_revenue
            .checked_add(self.basic_subscription_revenue);
        let combined = self.revenue_buys.checked_add(self.revenue_subscriptions);
        subscriptions == Some(self.revenue_subscriptions)
            && combined == Some(self.total_combined_revenue)
    }
}

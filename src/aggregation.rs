// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Aggregation Engine
//!
//! Maintains the `daily_statistics` and `daily_financials` rows inside the
//! same write transaction as the mutation that produced each event.
//!
//! ## Day Rollover
//!
//! The first event of a new day creates that day's rows:
//!
//! - **Level counters** (`total_users`, `total_subscriptions`,
//!   `premium_subscriptions`, `basic_subscriptions`) are carried forward from
//!   the newest earlier row
//! - **Flow counters** (`total_shows_bought` and every revenue column) start
//!   at zero
//!
//! Rows for days earlier than the newest existing row are never edited; an
//! event dated before it is rejected as a [`ConsistencyError`].

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{DailyFinancials, DailyStatistics, Money, SubscriptionLevel};
use crate::storage::{AggregateRepository, StoreError, WriteScope};

/// A state change that moves the daily aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateEvent {
    /// An account was created at `level`, paying `fee`.
    UserCreated { level: SubscriptionLevel, fee: Money },
    /// An account at `level` was deleted.
    UserDeleted { level: SubscriptionLevel },
    /// A customer moved between tiers; `charge` is revenue for the new tier.
    SubscriptionChanged {
        from: SubscriptionLevel,
        to: SubscriptionLevel,
        charge: Money,
    },
    /// A Basic customer bought a Premium show.
    ShowPurchased { cost: Money },
    /// Purchase rows were deleted by a show deletion. Revenue is kept.
    ShowUnpurchasedByDeletion { purchases: u64 },
}

impl AggregateEvent {
    fn name(&self) -> &'static str {
        match self {
            AggregateEvent::UserCreated { .. } => "user_created",
            AggregateEvent::UserDeleted { .. } => "user_deleted",
            AggregateEvent::SubscriptionChanged { .. } => "subscription_changed",
            AggregateEvent::ShowPurchased { .. } => "show_purchased",
            AggregateEvent::ShowUnpurchasedByDeletion { .. } => "show_unpurchased_by_deletion",
        }
    }
}

/// The derived aggregates cannot absorb an event without breaking an invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("event dated {event} precedes the latest aggregate row {latest}")]
    PastDate { event: NaiveDate, latest: NaiveDate },

    #[error("counter {0} would drop below zero")]
    Underflow(&'static str),

    #[error("counter {0} overflowed")]
    Overflow(&'static str),

    #[error("revenue totals for {0} do not balance")]
    Unbalanced(NaiveDate),
}

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Apply one event to the aggregate rows for `date`.
pub fn on_event(
    scope: &WriteScope,
    event: &AggregateEvent,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), AggregationError> {
    let repo = AggregateRepository::new(scope);

    if let Some(latest) = repo.latest_date()? {
        if date < latest {
            return Err(ConsistencyError::PastDate {
                event: date,
                latest,
            }
            .into());
        }
    }

    let mut stats = match repo.statistics(date)? {
        Some(row) => row,
        None => open_statistics(repo.statistics_before(date)?, date, now),
    };
    let mut fin = match repo.financials(date)? {
        Some(row) => row,
        None => open_financials(date, now),
    };

    apply(&mut stats, &mut fin, event)?;

    fin.total_combined_revenue = add(fin.revenue_buys, fin.revenue_subscriptions, "total_combined_revenue")?;
    if !fin.is_balanced() {
        return Err(ConsistencyError::Unbalanced(date).into());
    }
    stats.last_updated = now;
    fin.last_updated = now;

    repo.put_statistics(&stats)?;
    repo.put_financials(&fin)?;

    tracing::debug!(
        event = event.name(),
        date = %date,
        total_users = stats.total_users,
        total_combined_revenue = %fin.total_combined_revenue,
        "Aggregates updated"
    );
    Ok(())
}

/// A fresh statistics row: levels carried from `previous`, flows zeroed.
fn open_statistics(
    previous: Option<DailyStatistics>,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> DailyStatistics {
    let (total_users, total_subscriptions, premium, basic) = previous
        .map(|p| {
            (
                p.total_users,
                p.total_subscriptions,
                p.premium_subscriptions,
                p.basic_subscriptions,
            )
        })
        .unwrap_or_default();

    DailyStatistics {
        date,
        total_shows_bought: 0,
        total_subscriptions,
        premium_subscriptions: premium,
        basic_subscriptions: basic,
        total_users,
        last_updated: now,
    }
}

fn open_financials(date: NaiveDate, now: DateTime<Utc>) -> DailyFinancials {
    DailyFinancials {
        date,
        revenue_buys: Money::ZERO,
        revenue_subscriptions: Money::ZERO,
        premium_subscription_revenue: Money::ZERO,
        basic_subscription_revenue: Money::ZERO,
        total_combined_revenue: Money::ZERO,
        last_updated: now,
    }
}

fn apply(
    stats: &mut DailyStatistics,
    fin: &mut DailyFinancials,
    event: &AggregateEvent,
) -> Result<(), ConsistencyError> {
    match *event {
        AggregateEvent::UserCreated { level, fee } => {
            stats.total_users = inc(stats.total_users, "total_users")?;
            stats.total_subscriptions = inc(stats.total_subscriptions, "total_subscriptions")?;
            let (name, counter) = level_counter(stats, level);
            *counter = inc(*counter, name)?;
            subscription_revenue(fin, level, fee)?;
        }
        AggregateEvent::UserDeleted { level } => {
            stats.total_users = dec(stats.total_users, "total_users")?;
            stats.total_subscriptions = dec(stats.total_subscriptions, "total_subscriptions")?;
            let (name, counter) = level_counter(stats, level);
            *counter = dec(*counter, name)?;
        }
        AggregateEvent::SubscriptionChanged { from, to, charge } => {
            let (name, counter) = level_counter(stats, from);
            *counter = dec(*counter, name)?;
            let (name, counter) = level_counter(stats, to);
            *counter = inc(*counter, name)?;
            subscription_revenue(fin, to, charge)?;
        }
        AggregateEvent::ShowPurchased { cost } => {
            stats.total_shows_bought = inc(stats.total_shows_bought, "total_shows_bought")?;
            fin.revenue_buys = add(fin.revenue_buys, cost, "revenue_buys")?;
        }
        AggregateEvent::ShowUnpurchasedByDeletion { .. } => {}
    }
    Ok(())
}

fn level_counter(
    stats: &mut DailyStatistics,
    level: SubscriptionLevel,
) -> (&'static str, &mut u64) {
    match level {
        SubscriptionLevel::Basic => ("basic_subscriptions", &mut stats.basic_subscriptions),
        SubscriptionLevel::Premium => ("premium_subscriptions", &mut stats.premium_subscriptions),
    }
}

fn subscription_revenue(
    fin: &mut DailyFinancials,
    level: SubscriptionLevel,
    amount: Money,
) -> Result<(), ConsistencyError> {
    if amount == Money::ZERO {
        return Ok(());
    }
    match level {
        SubscriptionLevel::Basic => {
            fin.basic_subscription_revenue =
                add(fin.basic_subscription_revenue, amount, "basic_subscription_revenue")?;
        }
        SubscriptionLevel::Premium => {
            fin.premium_subscription_revenue =
                add(fin.premium_subscription_revenue, amount, "premium_subscription_revenue")?;
        }
    }
    fin.revenue_subscriptions = add(fin.revenue_subscriptions, amount, "revenue_subscriptions")?;
    Ok(())
}

fn inc(value: u64, name: &'static str) -> Result<u64, ConsistencyError> {
    value.checked_add(1).ok_or(ConsistencyError::Overflow(name))
}

fn dec(value: u64, name: &'static str) -> Result<u64, ConsistencyError> {
    value.checked_sub(1).ok_or(ConsistencyError::Underflow(name))
}

fn add(a: Money, b: Money, name: &'static str) -> Result<Money, ConsistencyError> {
    a.checked_add(b).ok_or(ConsistencyError::Overflow(name))
}

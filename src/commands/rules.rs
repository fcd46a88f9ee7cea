// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Business decisions, free of storage and I/O.
//!
//! Handlers load rows, ask these functions what should happen, then write
//! the outcome. Everything here is deterministic given its inputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::args::{ListShowsArgs, ShowFields, ShowPatch, SortKey, SortOrder};
use crate::error::MediatorError;
use crate::models::{AccessGroup, Money, Show, SubscriptionLevel};

// =============================================================================
// Acquisition
// =============================================================================

/// What adding a show to a library costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Included in the customer's tier.
    Included,
    /// Basic customer buying a Premium show.
    Purchase(Money),
}

pub fn acquisition(level: SubscriptionLevel, show: &Show) -> Result<Acquisition, MediatorError> {
    match (level, show.access_group) {
        (SubscriptionLevel::Basic, AccessGroup::Premium) => match show.cost_to_buy {
            Some(cost) => Ok(Acquisition::Purchase(cost)),
            None => Err(MediatorError::Internal(format!(
                "premium show {} has no price",
                show.id
            ))),
        },
        _ => Ok(Acquisition::Included),
    }
}

/// Add a charge to a customer's running total.
pub fn add_spend(total: Money, charge: Money) -> Result<Money, MediatorError> {
    total
        .checked_add(charge)
        .ok_or_else(|| MediatorError::Internal("total_spent overflow".to_string()))
}

// =============================================================================
// Subscriptions
// =============================================================================

/// The charge for moving from `current` to `requested`.
pub fn subscription_charge(
    current: SubscriptionLevel,
    requested: SubscriptionLevel,
    upgrade_price: Money,
) -> Result<Money, MediatorError> {
    match (current, requested) {
        (SubscriptionLevel::Basic, SubscriptionLevel::Premium) => Ok(upgrade_price),
        (SubscriptionLevel::Premium, SubscriptionLevel::Basic) => Ok(Money::ZERO),
        (level, _) => Err(MediatorError::Conflict(format!(
            "subscription is already {level}"
        ))),
    }
}

/// The fee charged when an account is opened at `level`.
pub fn signup_fee(level: SubscriptionLevel, basic_fee: Money, premium_fee: Money) -> Money {
    match level {
        SubscriptionLevel::Basic => basic_fee,
        SubscriptionLevel::Premium => premium_fee,
    }
}

// =============================================================================
// Favourite Genre
// =============================================================================

/// Most common genre among the given shows; ties go to the alphabetically
/// first genre. `None` for an empty library.
///
/// Callers pass the genres of the customer's current library rather than
/// their purchase history, so shows included with the plan count and
/// removed shows do not.
pub fn favourite_genre<'a>(genres: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for genre in genres {
        *counts.entry(genre).or_default() += 1;
    }
    // BTreeMap iterates alphabetically; keep the first of equal counts
    let mut best: Option<(&str, usize)> = None;
    for (genre, count) in counts {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((genre, count));
        }
    }
    best.map(|(genre, _)| genre.to_string())
}

// =============================================================================
// Show Validation
// =============================================================================

/// Check the price/tier pairing of a show.
pub fn check_pricing(
    access_group: AccessGroup,
    cost_to_buy: Option<Money>,
) -> Result<(), MediatorError> {
    match (access_group, cost_to_buy) {
        (AccessGroup::Basic, Some(_)) => Err(MediatorError::validation(
            "cost_to_buy",
            "Basic shows have no purchase price",
        )),
        (AccessGroup::Premium, None) => Err(MediatorError::validation(
            "cost_to_buy",
            "is required for Premium shows",
        )),
        (_, Some(cost)) if cost.is_negative() => Err(MediatorError::validation(
            "cost_to_buy",
            "must not be negative",
        )),
        _ => Ok(()),
    }
}

pub fn check_new_show(fields: &ShowFields) -> Result<(), MediatorError> {
    check_pricing(fields.access_group, fields.cost_to_buy)
}

/// Apply an edit to a show and validate the result.
///
/// Moving a show to Basic without mentioning the price drops the price.
pub fn apply_patch(show: &Show, patch: &ShowPatch) -> Result<Show, MediatorError> {
    let mut edited = show.clone();
    if let Some(name) = &patch.name {
        edited.name = name.clone();
    }
    if let Some(date) = patch.release_date {
        edited.release_date = date;
    }
    if let Some(rating) = patch.rating {
        edited.rating = rating;
    }
    if let Some(director) = &patch.director {
        edited.director = director.clone();
    }
    if let Some(minutes) = patch.length_minutes {
        edited.length_minutes = minutes;
    }
    if let Some(genre) = &patch.genre {
        edited.genre = genre.clone();
    }
    if let Some(group) = patch.access_group {
        edited.access_group = group;
    }
    match patch.cost_to_buy {
        Some(cost) => edited.cost_to_buy = cost,
        None if edited.access_group == AccessGroup::Basic => edited.cost_to_buy = None,
        None => {}
    }

    check_pricing(edited.access_group, edited.cost_to_buy)?;
    Ok(edited)
}

// =============================================================================
// Catalog Listing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_count: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShowPage {
    pub shows: Vec<Show>,
    pub pagination: Pagination,
}

/// Filter, sort and paginate the catalog.
pub fn select_shows(mut shows: Vec<Show>, query: &ListShowsArgs) -> ShowPage {
    let search = query.search.as_deref().map(str::to_lowercase);
    shows.retain(|show| {
        query
            .genre
            .as_deref()
            .is_none_or(|g| show.genre.eq_ignore_ascii_case(g))
            && query.access_group.is_none_or(|a| show.access_group == a)
            && query.rating.is_none_or(|r| show.rating == r)
            && search.as_deref().is_none_or(|needle| {
                show.name.to_lowercase().contains(needle)
                    || show.director.to_lowercase().contains(needle)
            })
    });

    shows.sort_by_key(|show| show.id);
    shows.sort_by(|a, b| {
        let ordering = compare(a, b, query.sort_by);
        match query.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total_count = shows.len() as u64;
    let limit = u64::from(query.limit);
    let total_pages = total_count.div_ceil(limit);
    let page = u64::from(query.page);
    let start = usize::try_from((page - 1) * limit).unwrap_or(usize::MAX);

    let shows = shows
        .into_iter()
        .skip(start)
        .take(query.limit as usize)
        .collect();

    ShowPage {
        shows,
        pagination: Pagination {
            page: query.page,
            limit: query.limit,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    }
}

fn compare(a: &Show, b: &Show, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Rating => a.rating.cmp(&b.rating),
        SortKey::ReleaseDate => a.release_date.cmp(&b.release_date),
        SortKey::Genre => a.genre.to_lowercase().cmp(&b.genre.to_lowercase()),
        SortKey::Length => a.length_minutes.cmp(&b.length_minutes),
    }
}

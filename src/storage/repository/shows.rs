// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Show catalog repository.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::super::database::{
    Scope, StoreError, StoreResult, WriteScope, LIBRARY, PURCHASES, PURCHASE_PAIRS, SHOWS,
};
use crate::models::{AccessGroup, Money, Purchase, Rating, Show};

/// Input for creating a show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShow {
    pub name: String,
    pub release_date: NaiveDate,
    pub rating: Rating,
    pub director: String,
    pub length_minutes: u32,
    pub genre: String,
    pub access_group: AccessGroup,
    pub cost_to_buy: Option<Money>,
}

/// Everything a show deletion removed.
#[derive(Debug, Clone)]
pub struct ShowRemoval {
    pub show: Show,
    /// Customers whose library contained the show.
    pub owners: Vec<u64>,
    /// Purchase rows deleted with the show.
    pub purchases: Vec<Purchase>,
}

/// Repository for show catalog operations.
pub struct ShowRepository<'a, S> {
    scope: &'a S,
}

impl<'a, S: Scope> ShowRepository<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    pub fn find(&self, id: u64) -> StoreResult<Option<Show>> {
        self.scope.row(SHOWS, id)
    }

    /// Get a show by ID.
    pub fn get(&self, id: u64) -> StoreResult<Show> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Show {id}")))
    }

    /// All shows in id order.
    pub fn list(&self) -> StoreResult<Vec<Show>> {
        self.scope.rows(SHOWS)
    }

    /// Distinct genres, sorted.
    pub fn genres(&self) -> StoreResult<Vec<String>> {
        let genres: BTreeSet<String> = self.list()?.into_iter().map(|s| s.genre).collect();
        Ok(genres.into_iter().collect())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.list()?.is_empty())
    }
}

impl ShowRepository<'_, WriteScope> {
    pub fn create(&self, new: NewShow) -> StoreResult<Show> {
        let id = self.scope.next_id("shows")?;
        let show = Show {
            id,
            name: new.name,
            release_date: new.release_date,
            rating: new.rating,
            director: new.director,
            length_minutes: new.length_minutes,
            genre: new.genre,
            access_group: new.access_group,
            cost_to_buy: new.cost_to_buy,
        };
        self.scope.put_row(SHOWS, id, &show)?;
        Ok(show)
    }

    pub fn update(&self, show: &Show) -> StoreResult<()> {
        if self.find(show.id)?.is_none() {
            return Err(StoreError::NotFound(format!("Show {}", show.id)));
        }
        self.scope.put_row(SHOWS, show.id, show)
    }

    /// Delete a show, dropping it from every library and deleting its
    /// purchase rows.
    pub fn delete(&self, id: u64) -> StoreResult<ShowRemoval> {
        let show = self.get(id)?;

        let mut owners = Vec::new();
        for (customer_id, show_id) in self.scope.pairs_with(LIBRARY, id)? {
            self.scope.unlink(LIBRARY, customer_id, show_id)?;
            owners.push(customer_id);
        }

        let mut purchases = Vec::new();
        for (customer_id, show_id) in self.scope.pairs_with(PURCHASE_PAIRS, id)? {
            if let Some(purchase_id) = self.scope.unlink(PURCHASE_PAIRS, customer_id, show_id)? {
                if let Some(purchase) = self.scope.row::<Purchase>(PURCHASES, purchase_id)? {
                    purchases.push(purchase);
                }
                self.scope.remove_row(PURCHASES, purchase_id)?;
            }
        }

        self.scope.remove_row(SHOWS, id)?;
        tracing::debug!(
            show_id = id,
            owners = owners.len(),
            purchases = purchases.len(),
            "Show removed with cascade"
        );

        Ok(ShowRemoval {
            show,
            owners,
            purchases,
        })
    }
}

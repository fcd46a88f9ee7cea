// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Purchase repository.
//!
//! `purchase_pairs` maps `(customer_id, show_id)` to the purchase id and is
//! the authoritative guard against buying the same show twice.

use chrono::NaiveDate;

use super::super::database::{
    Scope, StoreError, StoreResult, WriteScope, PURCHASES, PURCHASE_PAIRS,
};
use crate::models::{Money, Purchase};

pub struct PurchaseRepository<'a, S> {
    scope: &'a S,
}

impl<'a, S: Scope> PurchaseRepository<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    /// All purchases in id order.
    pub fn list(&self) -> StoreResult<Vec<Purchase>> {
        self.scope.rows(PURCHASES)
    }

    /// Purchases made by one customer, in id order.
    pub fn list_for_customer(&self, customer_id: u64) -> StoreResult<Vec<Purchase>> {
        let mut purchases = Vec::new();
        for (_, purchase_id) in self.scope.pairs_of(PURCHASE_PAIRS, customer_id)? {
            if let Some(purchase) = self.scope.row::<Purchase>(PURCHASES, purchase_id)? {
                purchases.push(purchase);
            }
        }
        purchases.sort_by_key(|p| p.id);
        Ok(purchases)
    }

    pub fn exists(&self, customer_id: u64, show_id: u64) -> StoreResult<bool> {
        Ok(self
            .scope
            .pair(PURCHASE_PAIRS, customer_id, show_id)?
            .is_some())
    }
}

impl PurchaseRepository<'_, WriteScope> {
    /// Record a purchase. `Conflict` if the pair was already bought.
    pub fn create(
        &self,
        customer_id: u64,
        show_id: u64,
        date: NaiveDate,
        cost: Money,
    ) -> StoreResult<Purchase> {
        let id = self.scope.next_id("purchases")?;
        self.scope
            .link(PURCHASE_PAIRS, customer_id, show_id, id)
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    StoreError::Conflict("show has already been purchased".to_string())
                }
                other => other,
            })?;

        let purchase = Purchase {
            id,
            customer_id,
            show_id,
            date,
            cost,
        };
        self.scope.put_row(PURCHASES, id, &purchase)?;
        Ok(purchase)
    }

    /// Delete every purchase of a customer; returns the removed rows.
    pub fn delete_for_customer(&self, customer_id: u64) -> StoreResult<Vec<Purchase>> {
        let mut removed = Vec::new();
        for (show_id, purchase_id) in self.scope.pairs_of(PURCHASE_PAIRS, customer_id)? {
            self.scope.unlink(PURCHASE_PAIRS, customer_id, show_id)?;
            if let Some(purchase) = self.scope.row::<Purchase>(PURCHASES, purchase_id)? {
                removed.push(purchase);
            }
            self.scope.remove_row(PURCHASES, purchase_id)?;
        }
        Ok(removed)
    }
}

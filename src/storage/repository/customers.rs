// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Customer repository.
//!
//! Customer rows live in `customers`; usernames and emails are claimed in
//! their uniqueness indexes in the same transaction that inserts the row.
//! Owned shows live in the `library` join table keyed by
//! `(customer_id, show_id)`.

use chrono::{DateTime, Utc};

use super::super::database::{
    Scope, StoreError, StoreResult, WriteScope, CUSTOMERS, CUSTOMER_EMAILS, CUSTOMER_USERNAMES,
    LIBRARY,
};
use super::normalize_key;
use crate::crypto::PasswordHash;
use crate::models::{Customer, CustomerView, Money, SubscriptionLevel};

/// Input for creating a customer row.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub username: String,
    pub email: String,
    pub password: PasswordHash,
    pub subscription_level: SubscriptionLevel,
    pub marketing_opt_in: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository for customer operations.
pub struct CustomerRepository<'a, S> {
    scope: &'a S,
}

impl<'a, S: Scope> CustomerRepository<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    pub fn find(&self, id: u64) -> StoreResult<Option<Customer>> {
        self.scope.row(CUSTOMERS, id)
    }

    /// Get a customer by ID.
    pub fn get(&self, id: u64) -> StoreResult<Customer> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Customer {id}")))
    }

    /// Look up a customer by username (case-insensitive).
    pub fn find_by_username(&self, username: &str) -> StoreResult<Option<Customer>> {
        match self
            .scope
            .lookup(CUSTOMER_USERNAMES, &normalize_key(username))?
        {
            Some(id) => self.find(id),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> StoreResult<Vec<Customer>> {
        self.scope.rows(CUSTOMERS)
    }

    /// IDs of the shows in a customer's library, ascending.
    pub fn owned_show_ids(&self, customer_id: u64) -> StoreResult<Vec<u64>> {
        Ok(self
            .scope
            .pairs_of(LIBRARY, customer_id)?
            .into_iter()
            .map(|(show_id, _)| show_id)
            .collect())
    }

    pub fn owns(&self, customer_id: u64, show_id: u64) -> StoreResult<bool> {
        Ok(self.scope.pair(LIBRARY, customer_id, show_id)?.is_some())
    }

    /// Customers that currently own a show.
    pub fn owners_of(&self, show_id: u64) -> StoreResult<Vec<u64>> {
        Ok(self
            .scope
            .pairs_with(LIBRARY, show_id)?
            .into_iter()
            .map(|(customer_id, _)| customer_id)
            .collect())
    }

    /// Build the client-facing view with the owned set attached.
    pub fn view(&self, customer: &Customer) -> StoreResult<CustomerView> {
        Ok(CustomerView::new(
            customer,
            self.owned_show_ids(customer.id)?,
        ))
    }
}

impl CustomerRepository<'_, WriteScope> {
    /// Insert a new customer, claiming its username and email.
    pub fn create(&self, new: NewCustomer) -> StoreResult<Customer> {
        let id = self.scope.next_id("customers")?;

        self.scope
            .claim(CUSTOMER_USERNAMES, &normalize_key(&new.username), id)
            .map_err(|e| conflict_as(e, "username is already registered"))?;
        self.scope
            .claim(CUSTOMER_EMAILS, &normalize_key(&new.email), id)
            .map_err(|e| conflict_as(e, "email is already registered"))?;

        let customer = Customer {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password.hash,
            salt: new.password.salt,
            subscription_level: new.subscription_level,
            total_spent: Money::ZERO,
            favourite_genre: None,
            marketing_opt_in: new.marketing_opt_in,
            created_at: new.created_at,
        };
        self.scope.put_row(CUSTOMERS, id, &customer)?;
        Ok(customer)
    }

    /// Overwrite an existing customer row.
    ///
    /// Username and email are fixed at creation; their index entries are not
    /// touched here.
    pub fn update(&self, customer: &Customer) -> StoreResult<()> {
        if self.find(customer.id)?.is_none() {
            return Err(StoreError::NotFound(format!("Customer {}", customer.id)));
        }
        self.scope.put_row(CUSTOMERS, customer.id, customer)
    }

    /// Add a show to a customer's library. `Conflict` if already owned.
    pub fn add_to_library(
        &self,
        customer_id: u64,
        show_id: u64,
        acquired_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let stamp = u64::try_from(acquired_at.timestamp()).unwrap_or(0);
        self.scope
            .link(LIBRARY, customer_id, show_id, stamp)
            .map_err(|e| conflict_as(e, "show is already in the library"))
    }

    /// Remove a show from a library; returns whether it was owned.
    pub fn remove_from_library(&self, customer_id: u64, show_id: u64) -> StoreResult<bool> {
        Ok(self.scope.unlink(LIBRARY, customer_id, show_id)?.is_some())
    }

    /// Delete a customer row, its index entries and its library.
    ///
    /// Purchase rows are removed separately through
    /// [`PurchaseRepository::delete_for_customer`](super::PurchaseRepository::delete_for_customer).
    pub fn delete(&self, id: u64) -> StoreResult<Customer> {
        let customer = self.get(id)?;

        for show_id in self.owned_show_ids(id)? {
            self.scope.unlink(LIBRARY, id, show_id)?;
        }
        self.scope
            .release(CUSTOMER_USERNAMES, &normalize_key(&customer.username))?;
        self.scope
            .release(CUSTOMER_EMAILS, &normalize_key(&customer.email))?;
        self.scope.remove_row(CUSTOMERS, id)?;

        Ok(customer)
    }
}

fn conflict_as(err: StoreError, message: &str) -> StoreError {
    match err {
        StoreError::Conflict(_) => StoreError::Conflict(message.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_password;
    use crate::storage::Store;

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    fn new_customer(username: &str, email: &str) -> NewCustomer {
        NewCustomer {
            username: username.to_string(),
            email: email.to_string(),
            password: hash_password("password123").unwrap(),
            subscription_level: SubscriptionLevel::Basic,
            marketing_opt_in: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_find_by_username() {
        let (store, _dir) = temp_store();
        let created = store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("Alice", "a@x.io")))
            .unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.total_spent, Money::ZERO);

        let found = store
            .read(|scope| CustomerRepository::new(scope).find_by_username("ALICE"))
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn duplicate_username_or_email_conflicts() {
        let (store, _dir) = temp_store();
        store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("alice", "a@x.io")))
            .unwrap();

        let same_name = store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("Alice", "b@x.io")));
        assert!(matches!(same_name, Err(StoreError::Conflict(m)) if m.contains("username")));

        let same_email = store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("bob", "A@X.IO")));
        assert!(matches!(same_email, Err(StoreError::Conflict(m)) if m.contains("email")));

        let all = store
            .read(|scope| CustomerRepository::new(scope).list())
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn library_add_remove_and_delete_cascade() {
        let (store, _dir) = temp_store();
        let alice = store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("alice", "a@x.io")))
            .unwrap();

        store
            .write(|scope| {
                let repo = CustomerRepository::new(scope);
                repo.add_to_library(alice.id, 3, Utc::now())?;
                repo.add_to_library(alice.id, 1, Utc::now())
            })
            .unwrap();

        let again = store
            .write(|scope| CustomerRepository::new(scope).add_to_library(alice.id, 3, Utc::now()));
        assert!(matches!(again, Err(StoreError::Conflict(_))));

        let view = store
            .read(|scope| CustomerRepository::new(scope).view(&alice))
            .unwrap();
        assert_eq!(view.owned_show_ids, vec![1, 3]);

        store
            .write(|scope| CustomerRepository::new(scope).delete(alice.id))
            .unwrap();
        let owners = store
            .read(|scope| CustomerRepository::new(scope).owners_of(3))
            .unwrap();
        assert!(owners.is_empty());

        // Username and email are free again
        store
            .write(|scope| CustomerRepository::new(scope).create(new_customer("alice", "a@x.io")))
            .unwrap();
    }
}

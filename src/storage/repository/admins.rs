// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Administrator credential repository.
//!
//! Admin rows are provisioned at startup and never cascade into customer data.

use chrono::{DateTime, Utc};

use super::super::database::{
    Scope, StoreError, StoreResult, WriteScope, ADMINS, ADMIN_USERNAMES,
};
use super::normalize_key;
use crate::crypto::PasswordHash;
use crate::models::AdminCredential;

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password: PasswordHash,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

pub struct AdminRepository<'a, S> {
    scope: &'a S,
}

impl<'a, S: Scope> AdminRepository<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    pub fn find(&self, id: u64) -> StoreResult<Option<AdminCredential>> {
        self.scope.row(ADMINS, id)
    }

    pub fn get(&self, id: u64) -> StoreResult<AdminCredential> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Admin {id}")))
    }

    pub fn find_by_username(&self, username: &str) -> StoreResult<Option<AdminCredential>> {
        match self.scope.lookup(ADMIN_USERNAMES, &normalize_key(username))? {
            Some(id) => self.find(id),
            None => Ok(None),
        }
    }
}

impl AdminRepository<'_, WriteScope> {
    pub fn create(&self, new: NewAdmin) -> StoreResult<AdminCredential> {
        let id = self.scope.next_id("admins")?;
        self.scope
            .claim(ADMIN_USERNAMES, &normalize_key(&new.username), id)
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    StoreError::Conflict("admin username is already registered".to_string())
                }
                other => other,
            })?;

        let admin = AdminCredential {
            id,
            username: new.username,
            password_hash: new.password.hash,
            salt: new.password.salt,
            role: new.role,
            created_at: new.created_at,
        };
        self.scope.put_row(ADMINS, id, &admin)?;
        Ok(admin)
    }

    /// Replace an admin's password hash and salt.
    pub fn set_password(&self, id: u64, password: PasswordHash) -> StoreResult<()> {
        let mut admin = self.get(id)?;
        admin.password_hash = password.hash;
        admin.salt = password.salt;
        self.scope.put_row(ADMINS, id, &admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_password, verify_password};
    use crate::storage::Store;

    #[test]
    fn create_lookup_and_rotate_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();

        let admin = store
            .write(|scope| {
                AdminRepository::new(scope).create(NewAdmin {
                    username: "Root".to_string(),
                    password: hash_password("first-password").unwrap(),
                    role: "admin".to_string(),
                    created_at: Utc::now(),
                })
            })
            .unwrap();

        store
            .write(|scope| {
                AdminRepository::new(scope)
                    .set_password(admin.id, hash_password("second-password").unwrap())
            })
            .unwrap();

        let found = store
            .read(|scope| AdminRepository::new(scope).find_by_username("root"))
            .unwrap()
            .unwrap();
        assert!(verify_password("second-password", &found.password_hash, &found.salt));
        assert!(!verify_password("first-password", &found.password_hash, &found.salt));

        let dup = store.write(|scope| {
            AdminRepository::new(scope).create(NewAdmin {
                username: "ROOT".to_string(),
                password: hash_password("x-password").unwrap(),
                role: "admin".to_string(),
                created_at: Utc::now(),
            })
        });
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }
}

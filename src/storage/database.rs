// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `customers`, `shows`, `purchases`, `admins`: id → serialized row (JSON bytes)
//! - `customer_usernames`, `customer_emails`, `admin_usernames`: normalized key → id
//! - `library`: (customer_id, show_id) → acquired_at (ownership join table)
//! - `purchase_pairs`: (customer_id, show_id) → purchase_id
//! - `daily_statistics`, `daily_financials`: `YYYY-MM-DD` → serialized row
//! - `sequences`: sequence name → last issued id
//!
//! redb admits a single write transaction at a time, which serializes every
//! mutation. Uniqueness indexes are checked inside that transaction, so they
//! stay authoritative even when two requests race past an earlier read.

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, TableHandle,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// id → JSON row.
pub type RowTable = TableDefinition<'static, u64, &'static [u8]>;
/// `YYYY-MM-DD` → JSON row.
pub type DayTable = TableDefinition<'static, &'static str, &'static [u8]>;
/// Normalized unique key → id.
pub type IndexTable = TableDefinition<'static, &'static str, u64>;
/// (left id, right id) → value.
pub type PairTable = TableDefinition<'static, (u64, u64), u64>;

pub const CUSTOMERS: RowTable = TableDefinition::new("customers");
pub const SHOWS: RowTable = TableDefinition::new("shows");
pub const PURCHASES: RowTable = TableDefinition::new("purchases");
pub const ADMINS: RowTable = TableDefinition::new("admins");

pub const CUSTOMER_USERNAMES: IndexTable = TableDefinition::new("customer_usernames");
pub const CUSTOMER_EMAILS: IndexTable = TableDefinition::new("customer_emails");
pub const ADMIN_USERNAMES: IndexTable = TableDefinition::new("admin_usernames");

pub const LIBRARY: PairTable = TableDefinition::new("library");
pub const PURCHASE_PAIRS: PairTable = TableDefinition::new("purchase_pairs");

pub const DAILY_STATISTICS: DayTable = TableDefinition::new("daily_statistics");
pub const DAILY_FINANCIALS: DayTable = TableDefinition::new("daily_financials");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("already exists: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// Store
// =============================================================================

/// Handle to the EasyFlix database file.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in [CUSTOMERS, SHOWS, PURCHASES, ADMINS] {
                let _ = write_txn.open_table(table)?;
            }
            for table in [CUSTOMER_USERNAMES, CUSTOMER_EMAILS, ADMIN_USERNAMES] {
                let _ = write_txn.open_table(table)?;
            }
            for table in [LIBRARY, PURCHASE_PAIRS] {
                let _ = write_txn.open_table(table)?;
            }
            for table in [DAILY_STATISTICS, DAILY_FINANCIALS] {
                let _ = write_txn.open_table(table)?;
            }
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` against a read snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&ReadScope) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let scope = ReadScope {
            txn: self.db.begin_read().map_err(StoreError::from)?,
        };
        f(&scope)
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts and discards every write when it
    /// returns `Err`.
    pub fn write<T, E>(&self, f: impl FnOnce(&WriteScope) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let scope = WriteScope {
            txn: self.db.begin_write().map_err(StoreError::from)?,
        };
        match f(&scope) {
            Ok(value) => {
                scope.txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = scope.txn.abort() {
                    tracing::error!(error = %abort_err, "Failed to abort write transaction");
                }
                Err(err)
            }
        }
    }

    /// Verify the database can serve a read transaction.
    pub fn health_check(&self) -> StoreResult<()> {
        let txn = self.db.begin_read()?;
        let _ = txn.open_table(SEQUENCES)?;
        Ok(())
    }
}

/// Read-only snapshot.
pub struct ReadScope {
    txn: ReadTransaction,
}

/// An open write transaction.
pub struct WriteScope {
    txn: WriteTransaction,
}

// =============================================================================
// Read Access (shared by both scopes)
// =============================================================================

/// Typed reads available on snapshots and inside write transactions.
pub trait Scope {
    fn row<T: DeserializeOwned>(&self, table: RowTable, id: u64) -> StoreResult<Option<T>>;

    /// All rows in ascending id order.
    fn rows<T: DeserializeOwned>(&self, table: RowTable) -> StoreResult<Vec<T>>;

    fn day<T: DeserializeOwned>(&self, table: DayTable, date: &str) -> StoreResult<Option<T>>;

    /// All day rows in ascending date order.
    fn days<T: DeserializeOwned>(&self, table: DayTable) -> StoreResult<Vec<T>>;

    /// The newest day row strictly before `date`.
    fn day_before<T: DeserializeOwned>(&self, table: DayTable, date: &str)
        -> StoreResult<Option<T>>;

    /// The newest day key in the table.
    fn latest_day_key(&self, table: DayTable) -> StoreResult<Option<String>>;

    fn lookup(&self, index: IndexTable, key: &str) -> StoreResult<Option<u64>>;

    fn pair(&self, table: PairTable, left: u64, right: u64) -> StoreResult<Option<u64>>;

    /// `(right, value)` for every pair whose left id is `left`.
    fn pairs_of(&self, table: PairTable, left: u64) -> StoreResult<Vec<(u64, u64)>>;

    /// Every `(left, right)` key whose right id is `right`.
    fn pairs_with(&self, table: PairTable, right: u64) -> StoreResult<Vec<(u64, u64)>>;
}

macro_rules! impl_scope {
    ($scope:ty) => {
        impl Scope for $scope {
            fn row<T: DeserializeOwned>(&self, table: RowTable, id: u64) -> StoreResult<Option<T>> {
                let table = self.txn.open_table(table)?;
                let found = match table.get(id)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
                Ok(found)
            }

            fn rows<T: DeserializeOwned>(&self, table: RowTable) -> StoreResult<Vec<T>> {
                let table = self.txn.open_table(table)?;
                let mut rows = Vec::new();
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    rows.push(decode(value.value())?);
                }
                Ok(rows)
            }

            fn day<T: DeserializeOwned>(
                &self,
                table: DayTable,
                date: &str,
            ) -> StoreResult<Option<T>> {
                let table = self.txn.open_table(table)?;
                let found = match table.get(date)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
                Ok(found)
            }

            fn days<T: DeserializeOwned>(&self, table: DayTable) -> StoreResult<Vec<T>> {
                let table = self.txn.open_table(table)?;
                let mut rows = Vec::new();
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    rows.push(decode(value.value())?);
                }
                Ok(rows)
            }

            fn day_before<T: DeserializeOwned>(
                &self,
                table: DayTable,
                date: &str,
            ) -> StoreResult<Option<T>> {
                let table = self.txn.open_table(table)?;
                let found = match table.range(..date)?.next_back() {
                    Some(entry) => {
                        let (_, value) = entry?;
                        Some(decode(value.value())?)
                    }
                    None => None,
                };
                Ok(found)
            }

            fn latest_day_key(&self, table: DayTable) -> StoreResult<Option<String>> {
                let table = self.txn.open_table(table)?;
                let found = match table.iter()?.next_back() {
                    Some(entry) => {
                        let (key, _) = entry?;
                        Some(key.value().to_string())
                    }
                    None => None,
                };
                Ok(found)
            }

            fn lookup(&self, index: IndexTable, key: &str) -> StoreResult<Option<u64>> {
                let table = self.txn.open_table(index)?;
                let found = table.get(key)?.map(|value| value.value());
                Ok(found)
            }

            fn pair(&self, table: PairTable, left: u64, right: u64) -> StoreResult<Option<u64>> {
                let table = self.txn.open_table(table)?;
                let found = table.get((left, right))?.map(|value| value.value());
                Ok(found)
            }

            fn pairs_of(&self, table: PairTable, left: u64) -> StoreResult<Vec<(u64, u64)>> {
                let table = self.txn.open_table(table)?;
                let mut pairs = Vec::new();
                for entry in table.range((left, 0)..=(left, u64::MAX))? {
                    let (key, value) = entry?;
                    pairs.push((key.value().1, value.value()));
                }
                Ok(pairs)
            }

            fn pairs_with(&self, table: PairTable, right: u64) -> StoreResult<Vec<(u64, u64)>> {
                let table = self.txn.open_table(table)?;
                let mut keys = Vec::new();
                for entry in table.iter()? {
                    let (key, _) = entry?;
                    let (l, r) = key.value();
                    if r == right {
                        keys.push((l, r));
                    }
                }
                Ok(keys)
            }
        }
    };
}

impl_scope!(ReadScope);
impl_scope!(WriteScope);

// =============================================================================
// Write Access
// =============================================================================

impl WriteScope {
    /// Issue the next id for a named sequence (ids start at 1).
    pub fn next_id(&self, sequence: &str) -> StoreResult<u64> {
        let mut table = self.txn.open_table(SEQUENCES)?;
        let last = table.get(sequence)?.map(|value| value.value()).unwrap_or(0);
        let next = last + 1;
        table.insert(sequence, next)?;
        Ok(next)
    }

    pub fn put_row<T: Serialize>(&self, table: RowTable, id: u64, row: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(row)?;
        let mut table = self.txn.open_table(table)?;
        table.insert(id, json.as_slice())?;
        Ok(())
    }

    /// Remove a row; returns whether it existed.
    pub fn remove_row(&self, table: RowTable, id: u64) -> StoreResult<bool> {
        let mut table = self.txn.open_table(table)?;
        let existed = table.remove(id)?.is_some();
        Ok(existed)
    }

    pub fn put_day<T: Serialize>(&self, table: DayTable, date: &str, row: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(row)?;
        let mut table = self.txn.open_table(table)?;
        table.insert(date, json.as_slice())?;
        Ok(())
    }

    /// Claim a unique key. Fails with `Conflict` if it is already taken.
    pub fn claim(&self, index: IndexTable, key: &str, id: u64) -> StoreResult<()> {
        let mut table = self.txn.open_table(index)?;
        let taken = table.get(key)?.is_some();
        if taken {
            return Err(StoreError::Conflict(format!("{} '{key}'", index.name())));
        }
        table.insert(key, id)?;
        Ok(())
    }

    pub fn release(&self, index: IndexTable, key: &str) -> StoreResult<()> {
        let mut table = self.txn.open_table(index)?;
        table.remove(key)?;
        Ok(())
    }

    /// Insert a pair. Fails with `Conflict` if the pair already exists.
    pub fn link(&self, table: PairTable, left: u64, right: u64, value: u64) -> StoreResult<()> {
        let mut t = self.txn.open_table(table)?;
        let exists = t.get((left, right))?.is_some();
        if exists {
            return Err(StoreError::Conflict(format!(
                "{} ({left}, {right})",
                table.name()
            )));
        }
        t.insert((left, right), value)?;
        Ok(())
    }

    /// Remove a pair; returns the stored value if it existed.
    pub fn unlink(&self, table: PairTable, left: u64, right: u64) -> StoreResult<Option<u64>> {
        let mut t = self.txn.open_table(table)?;
        let removed = t.remove((left, right))?.map(|value| value.value());
        Ok(removed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
    }

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    fn row(name: &str) -> Row {
        Row {
            name: name.to_string(),
        }
    }

    #[test]
    fn put_and_get_row() {
        let (store, _dir) = temp_store();
        store
            .write(|scope| scope.put_row(SHOWS, 7, &row("Up")))
            .unwrap();

        let found: Option<Row> = store.read(|scope| scope.row(SHOWS, 7)).unwrap();
        assert_eq!(found, Some(row("Up")));
        let missing: Option<Row> = store.read(|scope| scope.row(SHOWS, 8)).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn failed_write_rolls_back_everything() {
        let (store, _dir) = temp_store();
        let result: StoreResult<()> = store.write(|scope| {
            scope.put_row(SHOWS, 1, &row("Frozen"))?;
            scope.claim(CUSTOMER_USERNAMES, "alice", 1)?;
            Err(StoreError::NotFound("forced".to_string()))
        });
        assert!(result.is_err());

        let found: Option<Row> = store.read(|scope| scope.row(SHOWS, 1)).unwrap();
        assert!(found.is_none());
        let claimed = store
            .read(|scope| scope.lookup(CUSTOMER_USERNAMES, "alice"))
            .unwrap();
        assert!(claimed.is_none());
    }

    #[test]
    fn sequences_are_monotonic_per_name() {
        let (store, _dir) = temp_store();
        let ids: Vec<u64> = store
            .write(|scope| {
                Ok::<_, StoreError>(vec![
                    scope.next_id("customers")?,
                    scope.next_id("customers")?,
                    scope.next_id("shows")?,
                ])
            })
            .unwrap();
        assert_eq!(ids, vec![1, 2, 1]);
    }

    #[test]
    fn claim_rejects_duplicate_key() {
        let (store, _dir) = temp_store();
        store
            .write(|scope| scope.claim(CUSTOMER_EMAILS, "a@example.com", 1))
            .unwrap();
        let second = store.write(|scope| scope.claim(CUSTOMER_EMAILS, "a@example.com", 2));
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        store
            .write(|scope| scope.release(CUSTOMER_EMAILS, "a@example.com"))
            .unwrap();
        store
            .write(|scope| scope.claim(CUSTOMER_EMAILS, "a@example.com", 2))
            .unwrap();
    }

    #[test]
    fn pairs_are_unique_and_scannable() {
        let (store, _dir) = temp_store();
        store
            .write(|scope| {
                scope.link(LIBRARY, 1, 10, 100)?;
                scope.link(LIBRARY, 1, 11, 101)?;
                scope.link(LIBRARY, 2, 10, 102)
            })
            .unwrap();

        let dup = store.write(|scope| scope.link(LIBRARY, 1, 10, 999));
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let of_one = store.read(|scope| scope.pairs_of(LIBRARY, 1)).unwrap();
        assert_eq!(of_one, vec![(10, 100), (11, 101)]);
        let with_ten = store.read(|scope| scope.pairs_with(LIBRARY, 10)).unwrap();
        assert_eq!(with_ten, vec![(1, 10), (2, 10)]);

        let removed = store.write(|scope| scope.unlink(LIBRARY, 1, 10)).unwrap();
        assert_eq!(removed, Some(100));
        assert_eq!(store.read(|scope| scope.pair(LIBRARY, 1, 10)).unwrap(), None);
    }

    #[test]
    fn day_rows_are_ordered_by_date() {
        let (store, _dir) = temp_store();
        store
            .write(|scope| {
                scope.put_day(DAILY_STATISTICS, "2026-01-03", &row("c"))?;
                scope.put_day(DAILY_STATISTICS, "2026-01-01", &row("a"))?;
                scope.put_day(DAILY_STATISTICS, "2026-01-02", &row("b"))
            })
            .unwrap();

        let all: Vec<Row> = store.read(|scope| scope.days(DAILY_STATISTICS)).unwrap();
        assert_eq!(all, vec![row("a"), row("b"), row("c")]);

        let before: Option<Row> = store
            .read(|scope| scope.day_before(DAILY_STATISTICS, "2026-01-03"))
            .unwrap();
        assert_eq!(before, Some(row("b")));

        let none: Option<Row> = store
            .read(|scope| scope.day_before(DAILY_STATISTICS, "2026-01-01"))
            .unwrap();
        assert_eq!(none, None);

        let latest = store
            .read(|scope| scope.latest_day_key(DAILY_STATISTICS))
            .unwrap();
        assert_eq!(latest.as_deref(), Some("2026-01-03"));
    }

    #[test]
    fn health_check_passes_on_open_store() {
        let (store, _dir) = temp_store();
        assert!(store.health_check().is_ok());
    }
}

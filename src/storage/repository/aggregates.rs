// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Daily statistics and financials rows, keyed by `YYYY-MM-DD`.
//!
//! ISO dates sort lexicographically in date order, so redb range scans over
//! the string keys walk the days chronologically.

use chrono::NaiveDate;

use super::super::database::{
    Scope, StoreResult, WriteScope, DAILY_FINANCIALS, DAILY_STATISTICS,
};
use crate::models::{DailyFinancials, DailyStatistics};

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct AggregateRepository<'a, S> {
    scope: &'a S,
}

impl<'a, S: Scope> AggregateRepository<'a, S> {
    pub fn new(scope: &'a S) -> Self {
        Self { scope }
    }

    pub fn statistics(&self, date: NaiveDate) -> StoreResult<Option<DailyStatistics>> {
        self.scope.day(DAILY_STATISTICS, &date_key(date))
    }

    pub fn financials(&self, date: NaiveDate) -> StoreResult<Option<DailyFinancials>> {
        self.scope.day(DAILY_FINANCIALS, &date_key(date))
    }

    /// Newest statistics row dated strictly before `date`.
    pub fn statistics_before(&self, date: NaiveDate) -> StoreResult<Option<DailyStatistics>> {
        self.scope.day_before(DAILY_STATISTICS, &date_key(date))
    }

    /// Date of the newest row in either aggregate table.
    pub fn latest_date(&self) -> StoreResult<Option<NaiveDate>> {
        let stats = self.scope.latest_day_key(DAILY_STATISTICS)?;
        let fin = self.scope.latest_day_key(DAILY_FINANCIALS)?;
        let newest = match (stats, fin) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        Ok(newest.and_then(|key| NaiveDate::parse_from_str(&key, "%Y-%m-%d").ok()))
    }

    /// All statistics rows within `[from, to]` (either bound optional).
    pub fn statistics_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StoreResult<Vec<DailyStatistics>> {
        let rows: Vec<DailyStatistics> = self.scope.days(DAILY_STATISTICS)?;
        Ok(rows
            .into_iter()
            .filter(|row| in_range(row.date, from, to))
            .collect())
    }

    /// All financials rows within `[from, to]` (either bound optional).
    pub fn financials_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StoreResult<Vec<DailyFinancials>> {
        let rows: Vec<DailyFinancials> = self.scope.days(DAILY_FINANCIALS)?;
        Ok(rows
            .into_iter()
            .filter(|row| in_range(row.date, from, to))
            .collect())
    }
}

impl AggregateRepository<'_, WriteScope> {
    pub fn put_statistics(&self, row: &DailyStatistics) -> StoreResult<()> {
        self.scope.put_day(DAILY_STATISTICS, &date_key(row.date), row)
    }

    pub fn put_financials(&self, row: &DailyFinancials) -> StoreResult<()> {
        self.scope.put_day(DAILY_FINANCIALS, &date_key(row.date), row)
    }
}

fn in_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.is_none_or(|f| date >= f) && to.is_none_or(|t| date <= t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Store, StoreError};
    use chrono::Utc;

    fn stats(date: NaiveDate, users: u64) -> DailyStatistics {
        DailyStatistics {
            date,
            total_shows_bought: 0,
            total_subscriptions: users,
            premium_subscriptions: 0,
            basic_subscriptions: users,
            total_users: users,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn range_and_latest_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        let d = |day| NaiveDate::from_ymd_opt(2026, 2, day).unwrap();

        store
            .write(|scope| {
                let repo = AggregateRepository::new(scope);
                repo.put_statistics(&stats(d(1), 1))?;
                repo.put_statistics(&stats(d(5), 2))?;
                repo.put_statistics(&stats(d(9), 3))
            })
            .unwrap();

        store
            .read(|scope| {
                let repo = AggregateRepository::new(scope);
                assert_eq!(repo.latest_date()?, Some(d(9)));
                assert_eq!(repo.statistics_before(d(9))?.map(|r| r.total_users), Some(2));
                assert_eq!(repo.statistics_before(d(1))?, None);

                let mid = repo.statistics_range(Some(d(2)), Some(d(9)))?;
                assert_eq!(mid.iter().map(|r| r.date).collect::<Vec<_>>(), vec![d(5), d(9)]);
                assert_eq!(repo.statistics_range(None, None)?.len(), 3);
                assert!(repo.financials_range(None, None)?.is_empty());
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }
}

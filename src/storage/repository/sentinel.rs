// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Period-keyed dedup sentinels for scheduled batch jobs.
//!
//! A batch job acquires `(job, period)` before producing side effects;
//! a second acquisition within the TTL is refused, so a retried or
//! doubly-scheduled job reports "already executed" instead of
//! re-awarding. The TTL runs slightly longer than the period so a late
//! retry straddling the boundary still deduplicates.

use std::sync::Arc;

use chrono::{Duration, Utc};
use redb::{ReadableDatabase, ReadableTable};

use crate::storage::ledger_db::{LedgerDb, LedgerDbResult, JOB_SENTINELS};

/// Sentinel TTL for monthly jobs (~35 days).
pub const MONTHLY_TTL: Duration = Duration::days(35);

/// Sentinel TTL for weekly jobs (~8 days).
pub const WEEKLY_TTL: Duration = Duration::days(8);

/// Calendar-month period identifier, e.g. `2026-08`.
pub fn month_period(now: chrono::DateTime<Utc>) -> String {
    use chrono::Datelike;
    format!("{:04}-{:02}", now.year(), now.month())
}

/// ISO-week period identifier, e.g. `2026-W31`.
pub fn iso_week_period(now: chrono::DateTime<Utc>) -> String {
    use chrono::Datelike;
    let week = now.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}

/// Repository for batch-job sentinels.
pub struct JobSentinelRepository {
    db: Arc<LedgerDb>,
}

impl JobSentinelRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    fn key(job: &str, period: &str) -> String {
        format!("{job}|{period}")
    }

    /// Try to claim `(job, period)`. Returns `true` when this call
    /// claimed it; `false` when an unexpired claim already exists.
    pub fn try_acquire(&self, job: &str, period: &str, ttl: Duration) -> LedgerDbResult<bool> {
        let key = Self::key(job, period);
        let now = Utc::now().timestamp();

        let write_txn = self.db.raw().begin_write()?;
        let acquired = {
            let mut table = write_txn.open_table(JOB_SENTINELS)?;

            let live = match table.get(key.as_str())? {
                Some(guard) => {
                    let bytes: [u8; 8] = guard
                        .value()
                        .try_into()
                        .unwrap_or([0u8; 8]);
                    i64::from_be_bytes(bytes) > now
                }
                None => false,
            };

            if live {
                false
            } else {
                let expires_at = now + ttl.num_seconds();
                table.insert(key.as_str(), expires_at.to_be_bytes().as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(acquired)
    }

    /// Whether `(job, period)` currently holds an unexpired claim.
    pub fn is_claimed(&self, job: &str, period: &str) -> LedgerDbResult<bool> {
        let key = Self::key(job, period);
        let now = Utc::now().timestamp();

        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(JOB_SENTINELS)?;
        Ok(match table.get(key.as_str())? {
            Some(guard) => {
                let bytes: [u8; 8] = guard.value().try_into().unwrap_or([0u8; 8]);
                i64::from_be_bytes(bytes) > now
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger_db::test_support::test_db;

    #[test]
    fn second_acquire_in_period_is_refused() {
        let (db, _dir) = test_db();
        let repo = JobSentinelRepository::new(db);

        assert!(repo
            .try_acquire("guaranteed_comps", "2026-08", MONTHLY_TTL)
            .unwrap());
        assert!(!repo
            .try_acquire("guaranteed_comps", "2026-08", MONTHLY_TTL)
            .unwrap());

        // A different period or job is independent
        assert!(repo
            .try_acquire("guaranteed_comps", "2026-09", MONTHLY_TTL)
            .unwrap());
        assert!(repo
            .try_acquire("weekly_distribution", "2026-08", WEEKLY_TTL)
            .unwrap());
    }

    #[test]
    fn expired_claims_can_be_reacquired() {
        let (db, _dir) = test_db();
        let repo = JobSentinelRepository::new(db);

        assert!(repo
            .try_acquire("expire_batch", "2026-07", Duration::seconds(-1))
            .unwrap());
        // The claim expired immediately, so it is free again
        assert!(repo
            .try_acquire("expire_batch", "2026-07", WEEKLY_TTL)
            .unwrap());
    }

    #[test]
    fn period_identifiers() {
        use chrono::TimeZone;
        let date = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        assert_eq!(month_period(date), "2026-08");
        assert_eq!(iso_week_period(date), "2026-W32");

        // ISO week years roll at the year boundary
        let new_year = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(month_period(new_year), "2027-01");
    }

    #[test]
    fn is_claimed_reflects_live_claims() {
        let (db, _dir) = test_db();
        let repo = JobSentinelRepository::new(db);

        assert!(!repo.is_claimed("vault_bonus", "2026-08").unwrap());
        repo.try_acquire("vault_bonus", "2026-08", MONTHLY_TTL)
            .unwrap();
        assert!(repo.is_claimed("vault_bonus", "2026-08").unwrap());
    }
}

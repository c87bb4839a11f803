// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sunset status repository (singleton).
//!
//! The trigger is a one-way latch enforced inside the write transaction:
//! once `is_triggered` is set it can never be unset, and volume updates
//! never touch the latch.

use std::sync::Arc;

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};

use crate::models::{Amount, SunsetStatus, VolumeSnapshot};
use crate::storage::ledger_db::{LedgerDb, LedgerDbResult, SUNSET};

use super::{from_bytes, to_bytes};

const SUNSET_KEY: &str = "sunset";

/// Repository for the sunset singleton.
pub struct SunsetRepository {
    db: Arc<LedgerDb>,
    /// Threshold used when the singleton has not been written yet.
    default_threshold: Amount,
}

impl SunsetRepository {
    pub fn new(db: Arc<LedgerDb>, default_threshold: Amount) -> Self {
        Self {
            db,
            default_threshold,
        }
    }

    fn default_status(&self) -> SunsetStatus {
        SunsetStatus {
            threshold: self.default_threshold,
            ..Default::default()
        }
    }

    pub fn get(&self) -> LedgerDbResult<SunsetStatus> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(SUNSET)?;
        match table.get(SUNSET_KEY)? {
            Some(guard) => from_bytes(guard.value()),
            None => Ok(self.default_status()),
        }
    }

    pub fn is_triggered(&self) -> LedgerDbResult<bool> {
        Ok(self.get()?.is_triggered)
    }

    /// Record a volume observation. The latch is carried through
    /// untouched.
    pub fn record_snapshot(&self, snapshot: VolumeSnapshot) -> LedgerDbResult<SunsetStatus> {
        let write_txn = self.db.raw().begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(SUNSET)?;
            let mut status: SunsetStatus = match table.get(SUNSET_KEY)? {
                Some(guard) => from_bytes(guard.value())?,
                None => self.default_status(),
            };

            status.monthly_volume = snapshot.monthly_volume;
            status.rolling_3mo_avg = snapshot.rolling_3mo_avg;

            let bytes = to_bytes(&status)?;
            table.insert(SUNSET_KEY, bytes.as_slice())?;
            status
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Set the latch. Returns `true` if this call flipped it, `false`
    /// if it was already set (idempotent, never an error).
    pub fn trigger(&self) -> LedgerDbResult<bool> {
        let write_txn = self.db.raw().begin_write()?;
        let flipped = {
            let mut table = write_txn.open_table(SUNSET)?;
            let mut status: SunsetStatus = match table.get(SUNSET_KEY)? {
                Some(guard) => from_bytes(guard.value())?,
                None => self.default_status(),
            };

            if status.is_triggered {
                false
            } else {
                status.is_triggered = true;
                status.triggered_at = Some(Utc::now());
                let bytes = to_bytes(&status)?;
                table.insert(SUNSET_KEY, bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger_db::test_support::test_db;

    #[test]
    fn defaults_apply_until_first_write() {
        let (db, _dir) = test_db();
        let repo = SunsetRepository::new(db, Amount::from_dollars(10_000_000));

        let status = repo.get().unwrap();
        assert!(!status.is_triggered);
        assert_eq!(status.threshold, Amount::from_dollars(10_000_000));
    }

    #[test]
    fn trigger_is_a_one_way_idempotent_latch() {
        let (db, _dir) = test_db();
        let repo = SunsetRepository::new(db, Amount::from_dollars(10_000_000));

        assert!(repo.trigger().unwrap());
        // Second trigger reports "already triggered"
        assert!(!repo.trigger().unwrap());
        assert!(repo.is_triggered().unwrap());

        // Volume updates never clear the latch
        repo.record_snapshot(VolumeSnapshot {
            monthly_volume: Amount::from_dollars(1),
            rolling_3mo_avg: Amount::from_dollars(1),
        })
        .unwrap();
        assert!(repo.is_triggered().unwrap());
    }

    #[test]
    fn snapshots_update_volumes() {
        let (db, _dir) = test_db();
        let repo = SunsetRepository::new(db, Amount::from_dollars(10_000_000));

        let status = repo
            .record_snapshot(VolumeSnapshot {
                monthly_volume: Amount::from_dollars(6_000_000),
                rolling_3mo_avg: Amount::from_dollars(5_000_000),
            })
            .unwrap();

        assert_eq!(status.monthly_volume, Amount::from_dollars(6_000_000));
        assert!((status.percentage() - 50.0).abs() < f64::EPSILON);
    }
}

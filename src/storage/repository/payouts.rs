// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Affiliate payout repository.
//!
//! Payout status is monotonic: `pending → approved → paid`. The
//! transition guard runs inside the write transaction, so concurrent
//! approvals can't regress a row.

use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable};

use crate::models::{AffiliatePayout, PayoutStatus};
use crate::storage::ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, PAYOUTS};

use super::{from_bytes, to_bytes};

/// Repository for affiliate payouts.
pub struct PayoutRepository {
    db: Arc<LedgerDb>,
}

impl PayoutRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn get(&self, payout_id: &str) -> LedgerDbResult<AffiliatePayout> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(PAYOUTS)?;
        match table.get(payout_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("Payout {payout_id}"))),
        }
    }

    pub fn create(&self, payout: &AffiliatePayout) -> LedgerDbResult<()> {
        let bytes = to_bytes(payout)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(PAYOUTS)?;
            if table.get(payout.payout_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Payout {}",
                    payout.payout_id
                )));
            }
            table.insert(payout.payout_id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Advance a payout's status. Returns whether the row was mutated;
    /// a regressing or repeated transition touches nothing.
    pub fn advance_status(
        &self,
        payout_id: &str,
        next: PayoutStatus,
    ) -> LedgerDbResult<bool> {
        let write_txn = self.db.raw().begin_write()?;
        let mutated = {
            let mut table = write_txn.open_table(PAYOUTS)?;
            let mut payout: AffiliatePayout = match table.get(payout_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Payout {payout_id}"))),
            };

            if payout.advance_status(next) {
                let bytes = to_bytes(&payout)?;
                table.insert(payout_id, bytes.as_slice())?;
                true
            } else {
                false
            }
        };
        write_txn.commit()?;
        Ok(mutated)
    }

    /// Attach the on-chain hash once the payout has been broadcast.
    pub fn set_tx_hash(&self, payout_id: &str, tx_hash: &str) -> LedgerDbResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(PAYOUTS)?;
            let mut payout: AffiliatePayout = match table.get(payout_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Payout {payout_id}"))),
            };
            payout.tx_hash = Some(tx_hash.to_string());
            let bytes = to_bytes(&payout)?;
            table.insert(payout_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All payouts created for a period window.
    pub fn list_for_period(&self, period: &str) -> LedgerDbResult<Vec<AffiliatePayout>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(PAYOUTS)?;

        let mut payouts = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let payout: AffiliatePayout = from_bytes(value.value())?;
            if payout.period == period {
                payouts.push(payout);
            }
        }
        Ok(payouts)
    }
}

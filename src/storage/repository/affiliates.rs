// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Affiliate repository.
//!
//! Referral codes are indexed in their own table so attribution is a
//! point lookup. Affiliate creation is refused by the caller once the
//! sunset latch is set; this repository only enforces uniqueness.

use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable};

use crate::models::Affiliate;
use crate::storage::ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, AFFILIATES, REFERRAL_CODES};

use super::{from_bytes, to_bytes};

/// Repository for affiliate records.
pub struct AffiliateRepository {
    db: Arc<LedgerDb>,
}

impl AffiliateRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn exists(&self, member_id: &str) -> LedgerDbResult<bool> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(AFFILIATES)?;
        Ok(table.get(member_id)?.is_some())
    }

    pub fn get(&self, member_id: &str) -> LedgerDbResult<Affiliate> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(AFFILIATES)?;
        match table.get(member_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("Affiliate {member_id}"))),
        }
    }

    /// Resolve a referral code to its affiliate.
    pub fn find_by_code(&self, referral_code: &str) -> LedgerDbResult<Option<Affiliate>> {
        let read_txn = self.db.raw().begin_read()?;
        let codes = read_txn.open_table(REFERRAL_CODES)?;

        let member_id = match codes.get(referral_code)? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(AFFILIATES)?;
        match table.get(member_id.as_str())? {
            Some(guard) => Ok(Some(from_bytes(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Create an affiliate and index its referral code, atomically.
    pub fn create(&self, affiliate: &Affiliate) -> LedgerDbResult<()> {
        let bytes = to_bytes(affiliate)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(AFFILIATES)?;
            if table.get(affiliate.member_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Affiliate {}",
                    affiliate.member_id
                )));
            }

            let mut codes = write_txn.open_table(REFERRAL_CODES)?;
            if codes.get(affiliate.referral_code.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Referral code {}",
                    affiliate.referral_code
                )));
            }

            table.insert(affiliate.member_id.as_str(), bytes.as_slice())?;
            codes.insert(
                affiliate.referral_code.as_str(),
                affiliate.member_id.as_str(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

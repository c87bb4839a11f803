// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Affiliate chip repository.
//!
//! Vault and unvault are conditional batch updates: only chips owned by
//! the caller and in the right state are touched, and the count of
//! actually-mutated chips is returned. Zero is a normal outcome.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};

use crate::models::AffiliateChip;
use crate::storage::ledger_db::{
    index_key, index_range, LedgerDb, LedgerDbError, LedgerDbResult, AFFILIATE_CHIP_INDEX, CHIPS,
};

use super::{from_bytes, to_bytes};

/// Repository for affiliate chips.
pub struct ChipRepository {
    db: Arc<LedgerDb>,
}

impl ChipRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn get(&self, chip_id: &str) -> LedgerDbResult<AffiliateChip> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(CHIPS)?;
        match table.get(chip_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("Chip {chip_id}"))),
        }
    }

    /// Insert a chip and its affiliate index entry.
    pub fn create(&self, chip: &AffiliateChip) -> LedgerDbResult<()> {
        let bytes = to_bytes(chip)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(CHIPS)?;
            if table.get(chip.chip_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Chip {}",
                    chip.chip_id
                )));
            }
            table.insert(chip.chip_id.as_str(), bytes.as_slice())?;

            let mut index = write_txn.open_table(AFFILIATE_CHIP_INDEX)?;
            index.insert(index_key(&chip.affiliate_id, &chip.chip_id).as_str(), ())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All chips owned by an affiliate.
    pub fn list_for_affiliate(&self, affiliate_id: &str) -> LedgerDbResult<Vec<AffiliateChip>> {
        let read_txn = self.db.raw().begin_read()?;
        let index = read_txn.open_table(AFFILIATE_CHIP_INDEX)?;
        let table = read_txn.open_table(CHIPS)?;

        let (start, end) = index_range(affiliate_id);
        let mut chips = Vec::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (key, _) = entry?;
            let chip_id = key
                .value()
                .rsplit('|')
                .next()
                .unwrap_or_default()
                .to_string();
            if let Some(guard) = table.get(chip_id.as_str())? {
                chips.push(from_bytes(guard.value())?);
            }
        }
        Ok(chips)
    }

    /// Vault chips owned by `affiliate_id` that are neither vaulted nor
    /// expired. Returns the number actually vaulted.
    pub fn vault_chips(
        &self,
        affiliate_id: &str,
        chip_ids: &[String],
        now: DateTime<Utc>,
    ) -> LedgerDbResult<usize> {
        self.mutate_chips(affiliate_id, chip_ids, |chip| {
            if chip.is_vaulted || chip.is_expired {
                false
            } else {
                chip.vault(now);
                true
            }
        })
    }

    /// Unvault chips owned by `affiliate_id` that are vaulted and not
    /// expired. Returns the number actually unvaulted. Expired chips can
    /// never be unvaulted.
    pub fn unvault_chips(&self, affiliate_id: &str, chip_ids: &[String]) -> LedgerDbResult<usize> {
        self.mutate_chips(affiliate_id, chip_ids, |chip| {
            if !chip.is_vaulted || chip.is_expired {
                false
            } else {
                chip.unvault();
                true
            }
        })
    }

    fn mutate_chips<F>(
        &self,
        affiliate_id: &str,
        chip_ids: &[String],
        mut apply: F,
    ) -> LedgerDbResult<usize>
    where
        F: FnMut(&mut AffiliateChip) -> bool,
    {
        let write_txn = self.db.raw().begin_write()?;
        let mut mutated = 0usize;
        {
            let mut table = write_txn.open_table(CHIPS)?;
            for chip_id in chip_ids {
                let mut chip: AffiliateChip = match table.get(chip_id.as_str())? {
                    Some(guard) => from_bytes(guard.value())?,
                    None => continue,
                };
                if chip.affiliate_id != affiliate_id {
                    continue;
                }
                if apply(&mut chip) {
                    let bytes = to_bytes(&chip)?;
                    table.insert(chip_id.as_str(), bytes.as_slice())?;
                    mutated += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(mutated)
    }

    /// Expire every vaulted chip whose expiry has passed. One-way.
    /// Returns the number expired.
    pub fn expire_due(&self, now: DateTime<Utc>) -> LedgerDbResult<usize> {
        let write_txn = self.db.raw().begin_write()?;
        let mut expired = 0usize;
        {
            let mut table = write_txn.open_table(CHIPS)?;

            let mut due: Vec<AffiliateChip> = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let chip: AffiliateChip = from_bytes(value.value())?;
                if chip.is_vaulted
                    && !chip.is_expired
                    && chip.vault_expiry.is_some_and(|expiry| expiry <= now)
                {
                    due.push(chip);
                }
            }

            for mut chip in due {
                chip.is_expired = true;
                let bytes = to_bytes(&chip)?;
                table.insert(chip.chip_id.as_str(), bytes.as_slice())?;
                expired += 1;
            }
        }
        write_txn.commit()?;
        Ok(expired)
    }

    /// Count of non-expired chips per affiliate (weekly distribution
    /// input). Vaulted chips count; only expiry excludes a chip.
    pub fn active_counts(&self) -> LedgerDbResult<HashMap<String, u64>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(CHIPS)?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let chip: AffiliateChip = from_bytes(value.value())?;
            if !chip.is_expired {
                *counts.entry(chip.affiliate_id).or_default() += 1;
            }
        }
        Ok(counts)
    }

    /// Vaulted, unexpired chips per affiliate (vault bonus input).
    pub fn vaulted_unexpired(&self) -> LedgerDbResult<HashMap<String, Vec<AffiliateChip>>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(CHIPS)?;

        let mut by_affiliate: HashMap<String, Vec<AffiliateChip>> = HashMap::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let chip: AffiliateChip = from_bytes(value.value())?;
            if chip.is_vaulted && !chip.is_expired {
                by_affiliate
                    .entry(chip.affiliate_id.clone())
                    .or_default()
                    .push(chip);
            }
        }
        Ok(by_affiliate)
    }
}

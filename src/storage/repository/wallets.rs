// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet repository.
//!
//! `balance_available` never goes negative. Every balance change is a
//! guarded read-check-write inside one write transaction; a failed guard
//! reports zero rows mutated instead of clobbering concurrent updates.

use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable};

use crate::models::{Amount, Wallet};
use crate::storage::ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, WALLETS};

use super::{from_bytes, to_bytes};

/// Repository for member wallets.
pub struct WalletRepository {
    db: Arc<LedgerDb>,
}

impl WalletRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn exists(&self, member_id: &str) -> LedgerDbResult<bool> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        Ok(table.get(member_id)?.is_some())
    }

    pub fn get(&self, member_id: &str) -> LedgerDbResult<Wallet> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(member_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("Wallet {member_id}"))),
        }
    }

    pub fn create(&self, wallet: &Wallet) -> LedgerDbResult<()> {
        let bytes = to_bytes(wallet)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(wallet.member_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Wallet {}",
                    wallet.member_id
                )));
            }
            table.insert(wallet.member_id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Credit the available balance.
    pub fn credit_available(&self, member_id: &str, amount: Amount) -> LedgerDbResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match table.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Wallet {member_id}"))),
            };
            wallet.balance_available = wallet.balance_available + amount;
            let bytes = to_bytes(&wallet)?;
            table.insert(member_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Move funds from available to pending for a withdrawal in flight.
    /// Returns `false` (no mutation) when the available balance does not
    /// cover the amount.
    pub fn apply_withdrawal(&self, member_id: &str, amount: Amount) -> LedgerDbResult<bool> {
        let write_txn = self.db.raw().begin_write()?;
        let mutated = {
            let mut table = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match table.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Wallet {member_id}"))),
            };

            if wallet.balance_available < amount {
                false
            } else {
                wallet.balance_available = wallet.balance_available - amount;
                wallet.balance_pending = wallet.balance_pending + amount;
                let bytes = to_bytes(&wallet)?;
                table.insert(member_id, bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(mutated)
    }

    /// Settle a pending withdrawal: clears the pending amount once the
    /// on-chain transfer is final.
    pub fn settle_pending(&self, member_id: &str, amount: Amount) -> LedgerDbResult<bool> {
        let write_txn = self.db.raw().begin_write()?;
        let mutated = {
            let mut table = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match table.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Wallet {member_id}"))),
            };

            if wallet.balance_pending < amount {
                false
            } else {
                wallet.balance_pending = wallet.balance_pending - amount;
                let bytes = to_bytes(&wallet)?;
                table.insert(member_id, bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(mutated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger_db::test_support::test_db;

    #[test]
    fn credit_and_withdraw() {
        let (db, _dir) = test_db();
        let repo = WalletRepository::new(db);

        repo.create(&Wallet::new("mem-1", "0x1111111111111111111111111111111111111111"))
            .unwrap();

        repo.credit_available("mem-1", Amount::from_dollars(100))
            .unwrap();

        assert!(repo
            .apply_withdrawal("mem-1", Amount::from_dollars(40))
            .unwrap());

        let wallet = repo.get("mem-1").unwrap();
        assert_eq!(wallet.balance_available, Amount::from_dollars(60));
        assert_eq!(wallet.balance_pending, Amount::from_dollars(40));
    }

    #[test]
    fn withdrawal_guard_refuses_overdraft() {
        let (db, _dir) = test_db();
        let repo = WalletRepository::new(db);

        repo.create(&Wallet::new("mem-1", "0x1111111111111111111111111111111111111111"))
            .unwrap();
        repo.credit_available("mem-1", Amount::from_cents(500))
            .unwrap();

        // $5.01 against $5.00 available: zero rows mutated
        assert!(!repo
            .apply_withdrawal("mem-1", Amount::from_cents(501))
            .unwrap());

        let wallet = repo.get("mem-1").unwrap();
        assert_eq!(wallet.balance_available, Amount::from_cents(500));
        assert_eq!(wallet.balance_pending, Amount::ZERO);
    }

    #[test]
    fn settle_pending_clears_in_flight_funds() {
        let (db, _dir) = test_db();
        let repo = WalletRepository::new(db);

        repo.create(&Wallet::new("mem-1", "0x1111111111111111111111111111111111111111"))
            .unwrap();
        repo.credit_available("mem-1", Amount::from_dollars(10))
            .unwrap();
        repo.apply_withdrawal("mem-1", Amount::from_dollars(10))
            .unwrap();

        assert!(repo.settle_pending("mem-1", Amount::from_dollars(10)).unwrap());

        let wallet = repo.get("mem-1").unwrap();
        assert_eq!(wallet.balance_pending, Amount::ZERO);
    }

    #[test]
    fn missing_wallet_is_an_error() {
        let (db, _dir) = test_db();
        let repo = WalletRepository::new(db);

        assert!(matches!(
            repo.credit_available("ghost", Amount::from_cents(1)),
            Err(LedgerDbError::NotFound(_))
        ));
    }
}

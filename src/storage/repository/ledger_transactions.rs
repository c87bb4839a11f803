// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger transaction repository.
//!
//! Rows are append-only: status mutates, rows are never deleted. The
//! member index (`member_id|tx_id`) supports per-member scans for
//! milestone and guaranteed-comp sums.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use redb::{ReadableDatabase, ReadableTable};

use crate::models::{Amount, LedgerTransaction, LedgerTxKind, LedgerTxStatus, Wallet};
use crate::storage::ledger_db::{
    index_key, index_range, LedgerDb, LedgerDbError, LedgerDbResult, LEDGER_TXS, MEMBER_TX_INDEX,
    OUTBOX, WALLETS,
};

use super::outbox::OutboxEvent;
use super::{from_bytes, to_bytes};

/// Repository for ledger transactions.
pub struct LedgerTransactionRepository {
    db: Arc<LedgerDb>,
}

impl LedgerTransactionRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn get(&self, tx_id: &str) -> LedgerDbResult<LedgerTransaction> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(LEDGER_TXS)?;
        match table.get(tx_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("LedgerTransaction {tx_id}"))),
        }
    }

    /// Insert a transaction and its member index entry.
    pub fn create(&self, tx: &LedgerTransaction) -> LedgerDbResult<()> {
        self.create_inner(tx, None)
    }

    /// Insert a transaction together with an outbox event, atomically.
    /// The event becomes visible to the outbox consumer only if the
    /// ledger row committed.
    pub fn create_with_event(
        &self,
        tx: &LedgerTransaction,
        event: &OutboxEvent,
    ) -> LedgerDbResult<()> {
        self.create_inner(tx, Some(event))
    }

    fn create_inner(
        &self,
        tx: &LedgerTransaction,
        event: Option<&OutboxEvent>,
    ) -> LedgerDbResult<()> {
        let tx_bytes = to_bytes(tx)?;
        let event_bytes = event.map(to_bytes).transpose()?;

        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(LEDGER_TXS)?;
            if table.get(tx.id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "LedgerTransaction {}",
                    tx.id
                )));
            }
            table.insert(tx.id.as_str(), tx_bytes.as_slice())?;

            let mut index = write_txn.open_table(MEMBER_TX_INDEX)?;
            index.insert(index_key(&tx.member_id, &tx.id).as_str(), ())?;

            if let (Some(event), Some(bytes)) = (event, event_bytes.as_ref()) {
                let mut outbox = write_txn.open_table(OUTBOX)?;
                outbox.insert(event.event_id.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Resolve a pending-choice comp: credit the member's wallet and mark
    /// the row completed, in one write transaction. Appends the resolution
    /// outbox event atomically with both.
    ///
    /// Fails with `InvalidState` if the row is not in `pending_choice`,
    /// so a duplicate resolution attempt can never double-credit.
    pub fn resolve_pending_choice(
        &self,
        tx_id: &str,
        event: &OutboxEvent,
    ) -> LedgerDbResult<LedgerTransaction> {
        let event_bytes = to_bytes(event)?;

        let write_txn = self.db.raw().begin_write()?;
        let resolved = {
            let mut table = write_txn.open_table(LEDGER_TXS)?;
            let mut tx: LedgerTransaction = match table.get(tx_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => {
                    return Err(LedgerDbError::NotFound(format!(
                        "LedgerTransaction {tx_id}"
                    )))
                }
            };

            if tx.status != LedgerTxStatus::PendingChoice {
                return Err(LedgerDbError::InvalidState(format!(
                    "LedgerTransaction {tx_id} is not awaiting a payout choice"
                )));
            }

            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match wallets.get(tx.member_id.as_str())? {
                Some(guard) => from_bytes(guard.value())?,
                None => {
                    return Err(LedgerDbError::NotFound(format!("Wallet {}", tx.member_id)))
                }
            };
            wallet.balance_available = wallet.balance_available + tx.amount;
            let wallet_bytes = to_bytes(&wallet)?;
            wallets.insert(tx.member_id.as_str(), wallet_bytes.as_slice())?;

            tx.mark_status(LedgerTxStatus::Completed);
            let tx_bytes = to_bytes(&tx)?;
            table.insert(tx_id, tx_bytes.as_slice())?;

            let mut outbox = write_txn.open_table(OUTBOX)?;
            outbox.insert(event.event_id.as_str(), event_bytes.as_slice())?;

            tx
        };
        write_txn.commit()?;
        Ok(resolved)
    }

    /// Insert a completed transaction and credit the member's wallet, in
    /// one write transaction (direct credits such as reward matches).
    pub fn create_completed_with_credit(
        &self,
        tx: &LedgerTransaction,
        event: &OutboxEvent,
    ) -> LedgerDbResult<()> {
        let tx_bytes = to_bytes(tx)?;
        let event_bytes = to_bytes(event)?;

        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(LEDGER_TXS)?;
            if table.get(tx.id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "LedgerTransaction {}",
                    tx.id
                )));
            }

            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match wallets.get(tx.member_id.as_str())? {
                Some(guard) => from_bytes(guard.value())?,
                None => {
                    return Err(LedgerDbError::NotFound(format!("Wallet {}", tx.member_id)))
                }
            };
            wallet.balance_available = wallet.balance_available + tx.amount;
            let wallet_bytes = to_bytes(&wallet)?;
            wallets.insert(tx.member_id.as_str(), wallet_bytes.as_slice())?;

            table.insert(tx.id.as_str(), tx_bytes.as_slice())?;

            let mut index = write_txn.open_table(MEMBER_TX_INDEX)?;
            index.insert(index_key(&tx.member_id, &tx.id).as_str(), ())?;

            let mut outbox = write_txn.open_table(OUTBOX)?;
            outbox.insert(event.event_id.as_str(), event_bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Open a withdrawal: move the amount from the wallet's available
    /// balance to pending and record the ledger row, in one write
    /// transaction. Returns `None` (nothing touched) when the available
    /// balance does not cover the amount.
    pub fn create_withdrawal(
        &self,
        member_id: &str,
        to_address: &str,
        amount: Amount,
    ) -> LedgerDbResult<Option<LedgerTransaction>> {
        let write_txn = self.db.raw().begin_write()?;
        let opened = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallet: Wallet = match wallets.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Wallet {member_id}"))),
            };

            if wallet.balance_available < amount {
                None
            } else {
                wallet.balance_available = wallet.balance_available - amount;
                wallet.balance_pending = wallet.balance_pending + amount;
                let wallet_bytes = to_bytes(&wallet)?;
                wallets.insert(member_id, wallet_bytes.as_slice())?;

                let tx = LedgerTransaction::new_withdrawal(member_id, amount, to_address);
                let tx_bytes = to_bytes(&tx)?;
                let mut table = write_txn.open_table(LEDGER_TXS)?;
                table.insert(tx.id.as_str(), tx_bytes.as_slice())?;

                let mut index = write_txn.open_table(MEMBER_TX_INDEX)?;
                index.insert(index_key(member_id, &tx.id).as_str(), ())?;

                Some(tx)
            }
        };
        write_txn.commit()?;
        Ok(opened)
    }

    /// Persist a status/hash mutation on an existing row.
    pub fn update(&self, tx: &LedgerTransaction) -> LedgerDbResult<()> {
        let bytes = to_bytes(tx)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(LEDGER_TXS)?;
            if table.get(tx.id.as_str())?.is_none() {
                return Err(LedgerDbError::NotFound(format!(
                    "LedgerTransaction {}",
                    tx.id
                )));
            }
            table.insert(tx.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All transactions for a member.
    pub fn list_for_member(&self, member_id: &str) -> LedgerDbResult<Vec<LedgerTransaction>> {
        let read_txn = self.db.raw().begin_read()?;
        let index = read_txn.open_table(MEMBER_TX_INDEX)?;
        let table = read_txn.open_table(LEDGER_TXS)?;

        let (start, end) = index_range(member_id);
        let mut txs = Vec::new();
        for entry in index.range(start.as_str()..end.as_str())? {
            let (key, _) = entry?;
            let tx_id = key
                .value()
                .rsplit('|')
                .next()
                .unwrap_or_default()
                .to_string();
            if let Some(guard) = table.get(tx_id.as_str())? {
                txs.push(from_bytes(guard.value())?);
            }
        }
        Ok(txs)
    }

    /// Lifetime total of completed comps (milestone ladder input).
    pub fn completed_comp_total(&self, member_id: &str) -> LedgerDbResult<Amount> {
        let total = self
            .list_for_member(member_id)?
            .into_iter()
            .filter(|tx| is_comp(tx.kind) && tx.status == LedgerTxStatus::Completed)
            .map(|tx| tx.amount)
            .sum();
        Ok(total)
    }

    /// Sum of comps awarded to a member within a calendar month. Failed
    /// awards don't count; pending-choice awards do, so a re-run inside
    /// the month never tops a member up twice.
    pub fn comp_total_in_month(
        &self,
        member_id: &str,
        reference: DateTime<Utc>,
    ) -> LedgerDbResult<Amount> {
        let total = self
            .list_for_member(member_id)?
            .into_iter()
            .filter(|tx| {
                is_comp(tx.kind)
                    && tx.status != LedgerTxStatus::Failed
                    && tx.created_at.year() == reference.year()
                    && tx.created_at.month() == reference.month()
            })
            .map(|tx| tx.amount)
            .sum();
        Ok(total)
    }
}

fn is_comp(kind: LedgerTxKind) -> bool {
    matches!(kind, LedgerTxKind::CompAward | LedgerTxKind::GuaranteedComp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerTxKind;
    use crate::storage::ledger_db::test_support::test_db;
    use crate::storage::repository::outbox::{OutboxEventKind, OutboxRepository};

    #[test]
    fn create_get_and_update() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db);

        let mut tx = LedgerTransaction::new_pending_choice(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_dollars(100),
        );
        repo.create(&tx).unwrap();

        let loaded = repo.get(&tx.id).unwrap();
        assert_eq!(loaded.status, LedgerTxStatus::PendingChoice);

        tx.mark_status(LedgerTxStatus::Completed);
        repo.update(&tx).unwrap();
        assert_eq!(repo.get(&tx.id).unwrap().status, LedgerTxStatus::Completed);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db);

        let tx = LedgerTransaction::new_completed(
            "mem-1",
            LedgerTxKind::AffiliateMatch,
            Amount::from_cents(2100),
        );
        repo.create(&tx).unwrap();
        assert!(matches!(
            repo.create(&tx),
            Err(LedgerDbError::AlreadyExists(_))
        ));
    }

    #[test]
    fn member_scans_are_isolated() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db);

        for member in ["mem-1", "mem-1", "mem-2"] {
            let tx = LedgerTransaction::new_completed(
                member,
                LedgerTxKind::CompAward,
                Amount::from_dollars(100),
            );
            repo.create(&tx).unwrap();
        }

        assert_eq!(repo.list_for_member("mem-1").unwrap().len(), 2);
        assert_eq!(repo.list_for_member("mem-2").unwrap().len(), 1);
        assert!(repo.list_for_member("mem-3").unwrap().is_empty());
    }

    #[test]
    fn completed_comp_total_ignores_open_awards() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db);

        let done = LedgerTransaction::new_completed(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_dollars(100),
        );
        repo.create(&done).unwrap();

        let open = LedgerTransaction::new_pending_choice(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_dollars(1000),
        );
        repo.create(&open).unwrap();

        // A reward match is not a comp
        let match_tx = LedgerTransaction::new_completed(
            "mem-1",
            LedgerTxKind::AffiliateMatch,
            Amount::from_cents(2100),
        );
        repo.create(&match_tx).unwrap();

        assert_eq!(
            repo.completed_comp_total("mem-1").unwrap(),
            Amount::from_dollars(100)
        );
    }

    #[test]
    fn monthly_sum_counts_open_and_completed_comps() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db);

        let now = Utc::now();
        let a = LedgerTransaction::new_completed(
            "mem-1",
            LedgerTxKind::GuaranteedComp,
            Amount::from_cents(300),
        );
        repo.create(&a).unwrap();

        let b = LedgerTransaction::new_pending_choice(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_cents(150),
        );
        repo.create(&b).unwrap();

        let mut failed = LedgerTransaction::new_pending_choice(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_cents(9999),
        );
        failed.mark_status(LedgerTxStatus::Failed);
        repo.create(&failed).unwrap();

        assert_eq!(
            repo.comp_total_in_month("mem-1", now).unwrap(),
            Amount::from_cents(450)
        );
    }

    #[test]
    fn withdrawal_moves_available_to_pending_with_its_ledger_row() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db.clone());
        let wallets = crate::storage::repository::WalletRepository::new(db);

        wallets
            .create(&Wallet::new("mem-1", "0x1111111111111111111111111111111111111111"))
            .unwrap();
        wallets
            .credit_available("mem-1", Amount::from_dollars(50))
            .unwrap();

        let tx = repo
            .create_withdrawal(
                "mem-1",
                "0x2222222222222222222222222222222222222222",
                Amount::from_dollars(30),
            )
            .unwrap()
            .unwrap();
        assert_eq!(tx.kind, LedgerTxKind::Withdrawal);
        assert_eq!(tx.status, LedgerTxStatus::Pending);

        let wallet = wallets.get("mem-1").unwrap();
        assert_eq!(wallet.balance_available, Amount::from_dollars(20));
        assert_eq!(wallet.balance_pending, Amount::from_dollars(30));

        // Overdraft opens nothing: no row, no balance change
        assert!(repo
            .create_withdrawal(
                "mem-1",
                "0x2222222222222222222222222222222222222222",
                Amount::from_dollars(21),
            )
            .unwrap()
            .is_none());
        assert_eq!(repo.list_for_member("mem-1").unwrap().len(), 1);
    }

    #[test]
    fn outbox_event_commits_with_the_ledger_row() {
        let (db, _dir) = test_db();
        let repo = LedgerTransactionRepository::new(db.clone());
        let outbox = OutboxRepository::new(db);

        let tx = LedgerTransaction::new_pending_choice(
            "mem-1",
            LedgerTxKind::CompAward,
            Amount::from_dollars(100),
        );
        let event = OutboxEvent::new(
            OutboxEventKind::MilestoneAwarded,
            "mem-1",
            tx.amount,
            &tx.id,
        );
        repo.create_with_event(&tx, &event).unwrap();

        let unpublished = outbox.list_unpublished().unwrap();
        assert_eq!(unpublished.len(), 1);
        assert_eq!(unpublished[0].ledger_tx_id, tx.id);
    }
}

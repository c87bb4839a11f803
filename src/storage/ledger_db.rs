// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `members`: member_id → serialized Member
//! - `affiliates`: member_id → serialized Affiliate
//! - `referral_codes`: referral_code → member_id
//! - `wallets`: member_id → serialized Wallet
//! - `ledger_txs`: tx_id → serialized LedgerTransaction
//! - `member_tx_index`: composite key (member_id|tx_id) → ()
//! - `chips`: chip_id → serialized AffiliateChip
//! - `affiliate_chip_index`: composite key (affiliate_id|chip_id) → ()
//! - `payouts`: payout_id → serialized AffiliatePayout
//! - `sunset`: fixed key → serialized SunsetStatus singleton
//! - `job_sentinels`: (job|period) → expiry timestamp (unix secs, BE)
//! - `outbox`: event_id → serialized OutboxEvent
//!
//! Every mutation is a read-check-write inside a single write
//! transaction; repositories report how many rows they actually touched.

use std::path::Path;

use redb::{Database, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const MEMBERS: TableDefinition<&str, &[u8]> = TableDefinition::new("members");
pub(crate) const AFFILIATES: TableDefinition<&str, &[u8]> = TableDefinition::new("affiliates");
pub(crate) const REFERRAL_CODES: TableDefinition<&str, &str> =
    TableDefinition::new("referral_codes");
pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
pub(crate) const LEDGER_TXS: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger_txs");

/// Index: composite key `member_id|tx_id` → ().
pub(crate) const MEMBER_TX_INDEX: TableDefinition<&str, ()> =
    TableDefinition::new("member_tx_index");

pub(crate) const CHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("chips");

/// Index: composite key `affiliate_id|chip_id` → ().
pub(crate) const AFFILIATE_CHIP_INDEX: TableDefinition<&str, ()> =
    TableDefinition::new("affiliate_chip_index");

pub(crate) const PAYOUTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payouts");
pub(crate) const SUNSET: TableDefinition<&str, &[u8]> = TableDefinition::new("sunset");

/// Sentinels: `job|period` → expiry timestamp (unix seconds, big-endian).
pub(crate) const JOB_SENTINELS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("job_sentinels");

pub(crate) const OUTBOX: TableDefinition<&str, &[u8]> = TableDefinition::new("outbox");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
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

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type LedgerDbResult<T> = Result<T, LedgerDbError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Composite key for the per-owner index tables: `owner|row_id`.
pub(crate) fn index_key(owner: &str, row_id: &str) -> String {
    format!("{owner}|{row_id}")
}

/// Range bounds covering every index entry for an owner.
pub(crate) fn index_range(owner: &str) -> (String, String) {
    (format!("{owner}|"), format!("{owner}|\u{10FFFF}"))
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerDbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MEMBERS)?;
            let _ = write_txn.open_table(AFFILIATES)?;
            let _ = write_txn.open_table(REFERRAL_CODES)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(LEDGER_TXS)?;
            let _ = write_txn.open_table(MEMBER_TX_INDEX)?;
            let _ = write_txn.open_table(CHIPS)?;
            let _ = write_txn.open_table(AFFILIATE_CHIP_INDEX)?;
            let _ = write_txn.open_table(PAYOUTS)?;
            let _ = write_txn.open_table(SUNSET)?;
            let _ = write_txn.open_table(JOB_SENTINELS)?;
            let _ = write_txn.open_table(OUTBOX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn raw(&self) -> &Database {
        &self.db
    }
}

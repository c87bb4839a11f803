// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transactional outbox for milestone/reward side effects.
//!
//! Notification delivery lives outside this crate. Events are appended
//! in the same write transaction as the ledger row they describe (see
//! `LedgerTransactionRepository::create_with_event`), then drained and
//! marked published by the external consumer. A failed consumer never
//! loses an event and a rolled-back ledger write never leaks one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::models::Amount;
use crate::storage::ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, OUTBOX};

use super::{from_bytes, to_bytes};

/// What happened, for the notification consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEventKind {
    MilestoneAwarded,
    CompResolved,
    RewardMatched,
}

/// An event row committed atomically with its ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique identifier (UUID).
    pub event_id: String,
    pub kind: OutboxEventKind,
    pub member_id: String,
    pub amount: Amount,
    /// Ledger transaction this event describes.
    pub ledger_tx_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        kind: OutboxEventKind,
        member_id: &str,
        amount: Amount,
        ledger_tx_id: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            member_id: member_id.to_string(),
            amount,
            ledger_tx_id: ledger_tx_id.to_string(),
            created_at: Utc::now(),
            published_at: None,
        }
    }
}

/// Repository for outbox events.
pub struct OutboxRepository {
    db: Arc<LedgerDb>,
}

impl OutboxRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    /// Append an event outside a ledger write (rarely needed; prefer
    /// `create_with_event` on the ledger repository).
    pub fn append(&self, event: &OutboxEvent) -> LedgerDbResult<()> {
        let bytes = to_bytes(event)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(OUTBOX)?;
            table.insert(event.event_id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Events not yet handed to the notification consumer.
    pub fn list_unpublished(&self) -> LedgerDbResult<Vec<OutboxEvent>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(OUTBOX)?;

        let mut events = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let event: OutboxEvent = from_bytes(value.value())?;
            if event.published_at.is_none() {
                events.push(event);
            }
        }
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    /// Mark an event delivered. Returns whether the row was mutated
    /// (already-published events are left untouched).
    pub fn mark_published(&self, event_id: &str) -> LedgerDbResult<bool> {
        let write_txn = self.db.raw().begin_write()?;
        let mutated = {
            let mut table = write_txn.open_table(OUTBOX)?;
            let mut event: OutboxEvent = match table.get(event_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("OutboxEvent {event_id}"))),
            };

            if event.published_at.is_some() {
                false
            } else {
                event.published_at = Some(Utc::now());
                let bytes = to_bytes(&event)?;
                table.insert(event_id, bytes.as_slice())?;
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
    fn append_list_and_publish() {
        let (db, _dir) = test_db();
        let repo = OutboxRepository::new(db);

        let event = OutboxEvent::new(
            OutboxEventKind::MilestoneAwarded,
            "mem-1",
            Amount::from_dollars(100),
            "tx-1",
        );
        repo.append(&event).unwrap();

        let unpublished = repo.list_unpublished().unwrap();
        assert_eq!(unpublished.len(), 1);

        assert!(repo.mark_published(&event.event_id).unwrap());
        assert!(repo.list_unpublished().unwrap().is_empty());

        // Publishing twice is a no-op
        assert!(!repo.mark_published(&event.event_id).unwrap());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Member repository.

use std::sync::Arc;

use redb::{ReadableDatabase, ReadableTable};

use crate::models::Member;
use crate::storage::ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, MEMBERS};

use super::{from_bytes, to_bytes};

/// Repository for member records.
pub struct MemberRepository {
    db: Arc<LedgerDb>,
}

impl MemberRepository {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn exists(&self, member_id: &str) -> LedgerDbResult<bool> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(MEMBERS)?;
        Ok(table.get(member_id)?.is_some())
    }

    pub fn get(&self, member_id: &str) -> LedgerDbResult<Member> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(MEMBERS)?;
        match table.get(member_id)? {
            Some(guard) => from_bytes(guard.value()),
            None => Err(LedgerDbError::NotFound(format!("Member {member_id}"))),
        }
    }

    pub fn create(&self, member: &Member) -> LedgerDbResult<()> {
        let bytes = to_bytes(member)?;
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(MEMBERS)?;
            if table.get(member.member_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Member {}",
                    member.member_id
                )));
            }
            table.insert(member.member_id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// List all members (guaranteed-comp batch scan).
    pub fn list_all(&self) -> LedgerDbResult<Vec<Member>> {
        let read_txn = self.db.raw().begin_read()?;
        let table = read_txn.open_table(MEMBERS)?;

        let mut members = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            members.push(from_bytes(value.value())?);
        }
        Ok(members)
    }

    /// First-touch referral attribution: sets `referred_by` only if the
    /// member has no referrer yet and is not referring themselves.
    /// Returns whether the row was mutated.
    pub fn attribute(&self, member_id: &str, referrer_id: &str) -> LedgerDbResult<bool> {
        if member_id == referrer_id {
            return Ok(false);
        }

        let write_txn = self.db.raw().begin_write()?;
        let mutated = {
            let mut table = write_txn.open_table(MEMBERS)?;
            let mut member: Member = match table.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Member {member_id}"))),
            };

            if member.referred_by.is_some() {
                false
            } else {
                member.referred_by = Some(referrer_id.to_string());
                let bytes = to_bytes(&member)?;
                table.insert(member_id, bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(mutated)
    }

    /// Add referred units to a member's lifetime counter.
    pub fn add_referred_units(&self, member_id: &str, units: u64) -> LedgerDbResult<()> {
        let write_txn = self.db.raw().begin_write()?;
        {
            let mut table = write_txn.open_table(MEMBERS)?;
            let mut member: Member = match table.get(member_id)? {
                Some(guard) => from_bytes(guard.value())?,
                None => return Err(LedgerDbError::NotFound(format!("Member {member_id}"))),
            };
            member.referred_units = member.referred_units.saturating_add(units);
            let bytes = to_bytes(&member)?;
            table.insert(member_id, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

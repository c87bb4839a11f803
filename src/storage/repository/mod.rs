// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed repositories over the embedded ledger database.
//!
//! Each repository owns one slice of the data model and is the only
//! writer of that slice's status transitions. Mutations are
//! read-check-write inside a single write transaction and report the
//! number of rows actually touched; callers treat a zero count as a
//! normal no-op, not an error.

pub mod affiliates;
pub mod chips;
pub mod ledger_transactions;
pub mod members;
pub mod outbox;
pub mod payouts;
pub mod sentinel;
pub mod sunset;
pub mod wallets;

pub use affiliates::AffiliateRepository;
pub use chips::ChipRepository;
pub use ledger_transactions::LedgerTransactionRepository;
pub use members::MemberRepository;
pub use outbox::{OutboxEvent, OutboxEventKind, OutboxRepository};
pub use payouts::PayoutRepository;
pub use sentinel::JobSentinelRepository;
pub use sunset::SunsetRepository;
pub use wallets::WalletRepository;

use serde::{de::DeserializeOwned, Serialize};

use super::ledger_db::LedgerDbResult;

pub(crate) fn to_bytes<T: Serialize>(value: &T) -> LedgerDbResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> LedgerDbResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

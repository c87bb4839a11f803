// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage Module
//!
//! Persistent storage for the economic ledger, backed by an embedded
//! redb database (pure Rust, ACID, single file).
//!
//! ## Concurrency Model
//!
//! The engine may run behind multiple stateless instances, so no
//! correctness property relies on in-process state. Every mutation is a
//! conditional read-check-write inside one write transaction and
//! reports an affected-row count; lost updates under concurrent
//! vault/unvault or payout approvals are structurally impossible.
//!
//! ## Layout
//!
//! - [`ledger_db`]: database handle + table definitions
//! - [`repository`]: typed repositories per data-model slice

pub mod ledger_db;
pub mod repository;

pub use ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult};
pub use repository::{
    AffiliateRepository, ChipRepository, JobSentinelRepository, LedgerTransactionRepository,
    MemberRepository, OutboxEvent, OutboxEventKind, OutboxRepository, PayoutRepository,
    SunsetRepository, WalletRepository,
};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Treasury Engine - Signing & Economic Distribution Core
//!
//! This crate drives a remote KMS to sign outbound EVM transfers (no
//! private key material ever exists in-process), derives treasury pool
//! addresses, assembles EIP-155 transactions by hand, and runs the
//! profit-distribution and affiliate-chip economies over an embedded
//! ledger.
//!
//! ## Modules
//!
//! - `affiliate` - Referral attribution, chip lifecycle, weekly payouts, sunset
//! - `blockchain` - Chain client, KMS-backed signing, transfers, bridge
//! - `config` - Environment configuration
//! - `distribution` - Pool allocation, milestone comps, reward matching
//! - `kms` - Remote signer seam (Cloud KMS REST client)
//! - `models` - Domain data model (exact-cents amounts throughout)
//! - `state` - Constructed-once wiring for all components
//! - `storage` - Embedded redb ledger + typed repositories

pub mod affiliate;
pub mod blockchain;
pub mod config;
pub mod distribution;
pub mod kms;
pub mod models;
pub mod state;
pub mod storage;

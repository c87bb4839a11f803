// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM integration: chain client, KMS-backed signing, pool wallets,
//! transfers, and the cross-chain bridge.

pub mod bridge;
pub mod client;
pub mod erc20;
pub mod pools;
pub mod signer;
pub mod transfer;
pub mod types;

pub use bridge::{BridgeGateway, BridgeReceipt, BridgeStatus};
pub use client::{ChainClient, ChainClientError};
pub use pools::{Pool, PoolLocks, PoolWalletRegistry};
pub use signer::{derive_address, normalize_and_recover, KeySigner, SignerError};
pub use transfer::{TransferError, TransferExecutor};
pub use types::{NetworkConfig, TokenBalance, POLYGON_AMOY, POLYGON_MAINNET};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound ERC-20 transfers from treasury pools.
//!
//! Submission is strictly sequential per pool: the nonce fetch, signing,
//! and broadcast happen under a per-pool lock, so two transfers from the
//! same pool can never race on a nonce. Reads (balances, quotes) are not
//! serialized.
//!
//! No internal retry: resubmitting with a stale nonce double-spends the
//! slot, so retries are the caller's decision with a fresh call.

use std::sync::Arc;

use alloy::{
    consensus::TxLegacy,
    primitives::{TxKind, U256},
};
use tracing::info;

use crate::models::Amount;

use super::client::{parse_address, ChainClient, ChainClientError};
use super::erc20::transfer_calldata;
use super::pools::{Pool, PoolLocks, PoolWalletRegistry};
use super::signer::{KeySigner, SignerError};

/// Fixed gas limit with headroom for ERC-20 `transfer` calls.
const TRANSFER_GAS_LIMIT: u64 = 120_000;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("amount not representable: {0}")]
    InvalidAmount(String),
}

/// Executes signed ERC-20 transfers out of the treasury pools.
pub struct TransferExecutor {
    chain: Arc<ChainClient>,
    signer: Arc<KeySigner>,
    registry: Arc<PoolWalletRegistry>,
    locks: Arc<PoolLocks>,
}

impl TransferExecutor {
    pub fn new(
        chain: Arc<ChainClient>,
        signer: Arc<KeySigner>,
        registry: Arc<PoolWalletRegistry>,
        locks: Arc<PoolLocks>,
    ) -> Self {
        Self {
            chain,
            signer,
            registry,
            locks,
        }
    }

    /// Transfer `amount` of the settlement token from a pool wallet to
    /// `to_address`. Returns the transaction hash; the caller polls
    /// settlement.
    pub async fn transfer(
        &self,
        pool: Pool,
        to_address: &str,
        amount: Amount,
    ) -> Result<String, TransferError> {
        // Hold the pool lock across nonce fetch → broadcast
        let _guard = self.locks.acquire(pool).await;

        let from = self.registry.address_for(pool).await?;
        let to = parse_address(to_address)?;

        let token = &self.chain.network().settlement_token;
        let decimals = self.chain.token_decimals(token.address).await?;
        let raw_amount = amount_to_token_units(amount, decimals)?;

        let nonce = self.chain.nonce(from).await?;
        let gas_price = self.chain.gas_price().await?;

        let token_address = parse_address(token.address)?;
        let tx = TxLegacy {
            chain_id: Some(self.chain.network().chain_id),
            nonce,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: TxKind::Call(token_address),
            value: U256::ZERO,
            input: transfer_calldata(to, raw_amount),
        };

        let key_version = self.registry.key_version(pool);
        let raw = self.signer.sign_transaction(key_version, from, tx).await?;
        let tx_hash = self.chain.send_raw_transaction(&raw).await?;

        info!(
            pool = %pool,
            amount = %amount,
            to = to_address,
            tx_hash = %tx_hash,
            "pool transfer broadcast"
        );

        Ok(tx_hash)
    }
}

/// Convert an exact cent amount to the token's smallest unit. Truncates,
/// never rounding up, when the token has fewer than 2 decimals.
pub(crate) fn amount_to_token_units(amount: Amount, decimals: u8) -> Result<U256, TransferError> {
    let cents = amount.cents();
    if cents < 0 {
        return Err(TransferError::InvalidAmount(format!(
            "negative amount {amount}"
        )));
    }

    let cents = U256::from(cents as u64);
    let units = if decimals >= 2 {
        cents * U256::from(10u64).pow(U256::from(decimals - 2))
    } else {
        cents / U256::from(10u64).pow(U256::from(2 - decimals))
    };

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_to_usdc_units() {
        // $1.50 at 6 decimals → 1_500_000
        let units = amount_to_token_units(Amount::from_cents(150), 6).unwrap();
        assert_eq!(units, U256::from(1_500_000u64));

        // $42,000.00 at 6 decimals
        let units = amount_to_token_units(Amount::from_dollars(42_000), 6).unwrap();
        assert_eq!(units, U256::from(42_000_000_000u64));
    }

    #[test]
    fn cents_to_native_units() {
        // $1.00 at 18 decimals
        let units = amount_to_token_units(Amount::from_dollars(1), 18).unwrap();
        assert_eq!(units, U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn conversion_truncates_for_coarse_tokens() {
        // $1.59 at 0 decimals → 1 unit, never 2
        let units = amount_to_token_units(Amount::from_cents(159), 0).unwrap();
        assert_eq!(units, U256::from(1u64));

        // $1.59 at 1 decimal → 15
        let units = amount_to_token_units(Amount::from_cents(159), 1).unwrap();
        assert_eq!(units, U256::from(15u64));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(matches!(
            amount_to_token_units(Amount::from_cents(-1), 6),
            Err(TransferError::InvalidAmount(_))
        ));
    }
}

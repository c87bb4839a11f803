// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-chain transfers over the Stargate bridge.
//!
//! Swaps move settlement-token liquidity to a fixed destination chain.
//! The LayerZero messaging fee is quoted immediately before broadcast and
//! attached as the transaction's native value. Status polling is
//! advisory: it reads an external explorer API and never raises into
//! fund-movement paths.

use std::sync::Arc;
use std::time::Duration;

use alloy::{
    consensus::TxLegacy,
    primitives::{Address, Bytes, TxKind, U256},
    sol,
    sol_types::SolCall,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::Amount;

use super::client::{parse_address, ChainClient, ChainClientError};
use super::pools::{Pool, PoolLocks, PoolWalletRegistry};
use super::signer::{KeySigner, SignerError};
use super::transfer::amount_to_token_units;

// Stargate router ABI subset
sol! {
    struct LzTxObj {
        uint256 dstGasForCall;
        uint256 dstNativeAmount;
        bytes dstNativeAddr;
    }

    #[sol(rpc)]
    interface IStargateRouter {
        function quoteLayerZeroFee(
            uint16 dstChainId,
            uint8 functionType,
            bytes toAddress,
            bytes transferAndCallPayload,
            LzTxObj lzTxParams
        ) external view returns (uint256 nativeFee, uint256 zroFee);

        function swap(
            uint16 dstChainId,
            uint256 srcPoolId,
            uint256 dstPoolId,
            address refundAddress,
            uint256 amountLD,
            uint256 minAmountLD,
            LzTxObj lzTxParams,
            bytes to,
            bytes payload
        ) external payable;
    }
}

/// Stargate function type for a remote swap.
const FUNCTION_TYPE_SWAP: u8 = 1;

/// Slippage tolerance in basis points: accept no less than 99.5% of the
/// sent amount on the destination chain.
const MIN_AMOUNT_BPS: u64 = 9_950;

/// Gas limit with headroom for router swap calls.
const BRIDGE_GAS_LIMIT: u64 = 600_000;

/// Bounded timeout for the status explorer API.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("amount not representable: {0}")]
    InvalidAmount(String),
}

/// Result of a bridge swap broadcast.
#[derive(Debug, Clone)]
pub struct BridgeReceipt {
    pub tx_hash: String,
    pub amount: Amount,
}

/// Remote delivery status of a bridge message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Inflight,
    Delivered,
    Failed,
    /// Absent, ambiguous, or unreachable status data.
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    messages: Vec<StatusMessage>,
}

#[derive(Debug, Deserialize)]
struct StatusMessage {
    #[serde(default)]
    status: String,
}

/// Executes cross-chain swaps out of a source treasury pool.
pub struct BridgeGateway {
    chain: Arc<ChainClient>,
    signer: Arc<KeySigner>,
    registry: Arc<PoolWalletRegistry>,
    locks: Arc<PoolLocks>,
    /// Pool whose key funds and signs bridge swaps.
    source_pool: Pool,
    http: Client,
}

impl BridgeGateway {
    pub fn new(
        chain: Arc<ChainClient>,
        signer: Arc<KeySigner>,
        registry: Arc<PoolWalletRegistry>,
        locks: Arc<PoolLocks>,
        source_pool: Pool,
    ) -> Self {
        let http = Client::builder()
            .timeout(STATUS_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            chain,
            signer,
            registry,
            locks,
            source_pool,
            http,
        }
    }

    /// Quote the LayerZero messaging fee for a swap of `amount` to the
    /// fixed destination chain. Advisory only, no side effects.
    pub async fn quote(&self, amount: Amount) -> Result<U256, BridgeError> {
        debug!(amount = %amount, "quoting bridge fee");
        self.quote_fee(Address::ZERO).await
    }

    async fn quote_fee(&self, to: Address) -> Result<U256, BridgeError> {
        let bridge = &self.chain.network().bridge;
        let router = parse_address(bridge.router_address)?;
        let contract = IStargateRouter::new(router, self.chain.provider().clone());

        let quoted = contract
            .quoteLayerZeroFee(
                bridge.dst_chain_id,
                FUNCTION_TYPE_SWAP,
                Bytes::copy_from_slice(to.as_slice()),
                Bytes::new(),
                default_lz_params(),
            )
            .call()
            .await
            .map_err(|e| ChainClientError::ContractError(e.to_string()))?;

        Ok(quoted.nativeFee)
    }

    /// Swap `amount` of the settlement token to `destination_address` on
    /// the fixed destination chain. Same per-pool serialization as plain
    /// transfers; bridge swaps spend the same nonce sequence.
    pub async fn execute(
        &self,
        amount: Amount,
        destination_address: &str,
    ) -> Result<BridgeReceipt, BridgeError> {
        let _guard = self.locks.acquire(self.source_pool).await;

        let from = self.registry.address_for(self.source_pool).await?;
        let destination = parse_address(destination_address)?;

        let token = &self.chain.network().settlement_token;
        let decimals = self.chain.token_decimals(token.address).await?;
        let amount_ld = amount_to_token_units(amount, decimals)
            .map_err(|e| BridgeError::InvalidAmount(e.to_string()))?;
        let min_amount_ld = apply_slippage(amount_ld);

        // Re-quote immediately before broadcast; fees drift
        let native_fee = self.quote_fee(destination).await?;

        let bridge = &self.chain.network().bridge;
        let call = IStargateRouter::swapCall {
            dstChainId: bridge.dst_chain_id,
            srcPoolId: U256::from(bridge.src_pool_id),
            dstPoolId: U256::from(bridge.dst_pool_id),
            refundAddress: from,
            amountLD: amount_ld,
            minAmountLD: min_amount_ld,
            lzTxParams: default_lz_params(),
            to: Bytes::copy_from_slice(destination.as_slice()),
            payload: Bytes::new(),
        };

        let nonce = self.chain.nonce(from).await?;
        let gas_price = self.chain.gas_price().await?;
        let router = parse_address(bridge.router_address)?;

        let tx = TxLegacy {
            chain_id: Some(self.chain.network().chain_id),
            nonce,
            gas_price,
            gas_limit: BRIDGE_GAS_LIMIT,
            to: TxKind::Call(router),
            value: native_fee,
            input: call.abi_encode().into(),
        };

        let key_version = self.registry.key_version(self.source_pool);
        let raw = self.signer.sign_transaction(key_version, from, tx).await?;
        let tx_hash = self.chain.send_raw_transaction(&raw).await?;

        info!(
            pool = %self.source_pool,
            amount = %amount,
            destination = destination_address,
            tx_hash = %tx_hash,
            "bridge swap broadcast"
        );

        Ok(BridgeReceipt { tx_hash, amount })
    }

    /// Poll the remote message status for a swap transaction. Returns
    /// [`BridgeStatus::Unknown`] on any error or absent data, never an
    /// error.
    pub async fn status(&self, tx_hash: &str) -> BridgeStatus {
        let url = format!(
            "{}/tx/{}",
            self.chain.network().bridge.status_api_url,
            tx_hash
        );

        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(tx_hash, error = %e, "bridge status request failed");
                return BridgeStatus::Unknown;
            }
        };

        match response.json::<StatusResponse>().await {
            Ok(body) => parse_status(&body),
            Err(e) => {
                warn!(tx_hash, error = %e, "bridge status body was invalid");
                BridgeStatus::Unknown
            }
        }
    }
}

fn default_lz_params() -> LzTxObj {
    LzTxObj {
        dstGasForCall: U256::ZERO,
        dstNativeAmount: U256::ZERO,
        dstNativeAddr: Bytes::new(),
    }
}

/// `floor(amount · 0.995)` in liquidity-decimal units.
fn apply_slippage(amount_ld: U256) -> U256 {
    amount_ld * U256::from(MIN_AMOUNT_BPS) / U256::from(10_000u64)
}

fn parse_status(body: &StatusResponse) -> BridgeStatus {
    match body.messages.first() {
        Some(message) => match message.status.to_ascii_uppercase().as_str() {
            "INFLIGHT" => BridgeStatus::Inflight,
            "DELIVERED" => BridgeStatus::Delivered,
            "FAILED" => BridgeStatus::Failed,
            _ => BridgeStatus::Unknown,
        },
        None => BridgeStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_floor_is_half_percent() {
        assert_eq!(apply_slippage(U256::from(10_000u64)), U256::from(9_950u64));
        // floor, never round up: 1001 · 0.995 = 995.995 → 995
        assert_eq!(apply_slippage(U256::from(1_001u64)), U256::from(995u64));
        assert_eq!(apply_slippage(U256::ZERO), U256::ZERO);
    }

    #[test]
    fn status_parsing_maps_known_states() {
        let parse = |s: &str| {
            parse_status(&StatusResponse {
                messages: vec![StatusMessage {
                    status: s.to_string(),
                }],
            })
        };

        assert_eq!(parse("INFLIGHT"), BridgeStatus::Inflight);
        assert_eq!(parse("delivered"), BridgeStatus::Delivered);
        assert_eq!(parse("FAILED"), BridgeStatus::Failed);
        assert_eq!(parse("SOMETHING_NEW"), BridgeStatus::Unknown);
    }

    #[test]
    fn absent_messages_are_unknown() {
        assert_eq!(
            parse_status(&StatusResponse { messages: vec![] }),
            BridgeStatus::Unknown
        );
    }

    #[test]
    fn swap_calldata_encodes() {
        let call = IStargateRouter::swapCall {
            dstChainId: 101,
            srcPoolId: U256::from(1u64),
            dstPoolId: U256::from(1u64),
            refundAddress: Address::repeat_byte(0x11),
            amountLD: U256::from(1_000_000u64),
            minAmountLD: U256::from(995_000u64),
            lzTxParams: default_lz_params(),
            to: Bytes::copy_from_slice(Address::repeat_byte(0x22).as_slice()),
            payload: Bytes::new(),
        };
        let data = call.abi_encode();
        assert!(data.len() > 4);
    }
}

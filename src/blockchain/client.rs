// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain client for balance queries, fee data, and raw broadcast.
//!
//! Signing happens elsewhere (the remote KMS via `signer`); this client
//! only ever submits fully-signed raw bytes.

use std::str::FromStr;

use alloy::{
    network::Ethereum,
    primitives::Address,
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
};

use super::erc20::Erc20Contract;
use super::types::*;

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// EVM chain client.
pub struct ChainClient {
    /// Network configuration
    network: NetworkConfig,
    /// Alloy HTTP provider
    provider: HttpProvider,
}

impl ChainClient {
    /// Create a new client for the specified network and RPC endpoint.
    pub fn new(network: NetworkConfig, rpc_url: &str) -> Result<Self, ChainClientError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainClientError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self { network, provider })
    }

    /// Get the native token balance for an address.
    pub async fn native_balance(&self, address: &str) -> Result<TokenBalance, ChainClientError> {
        let addr = parse_address(address)?;

        let balance = self
            .provider
            .get_balance(addr)
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))?;

        Ok(TokenBalance {
            symbol: "POL".to_string(),
            balance_raw: balance.to_string(),
            balance_formatted: format_balance(balance, 18),
            decimals: 18,
            contract_address: None,
        })
    }

    /// Get an ERC-20 token balance, scaled by the token's on-chain decimals.
    pub async fn token_balance(
        &self,
        wallet_address: &str,
        token: &Erc20Token,
    ) -> Result<TokenBalance, ChainClientError> {
        let contract = Erc20Contract::new(&self.provider, token.address)?;
        contract.balance_of(wallet_address, token.symbol).await
    }

    /// Fetch the on-chain decimals for an ERC-20 token.
    pub async fn token_decimals(&self, token_address: &str) -> Result<u8, ChainClientError> {
        let contract = Erc20Contract::new(&self.provider, token_address)?;
        contract.decimals().await
    }

    /// Current account nonce (transaction count) for an address.
    pub async fn nonce(&self, address: Address) -> Result<u64, ChainClientError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }

    /// Current gas price in wei.
    pub async fn gas_price(&self) -> Result<u128, ChainClientError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| ChainClientError::RpcError(e.to_string()))
    }

    /// Broadcast a fully-signed raw transaction. Returns the 0x-prefixed
    /// transaction hash without waiting for confirmation.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ChainClientError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| classify_send_error(e.to_string()))?;

        Ok(format!("{:?}", pending.tx_hash()))
    }

    /// Get the underlying provider (for contract instances).
    pub(crate) fn provider(&self) -> &HttpProvider {
        &self.provider
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }
}

/// Parse a 0x-prefixed address string.
pub fn parse_address(address: &str) -> Result<Address, ChainClientError> {
    Address::from_str(address).map_err(|e| ChainClientError::InvalidAddress(e.to_string()))
}

/// Map a broadcast failure onto the typed error taxonomy. Insufficient
/// funds and reverts are terminal; everything else is surfaced as an RPC
/// error the caller may retry (with a fresh nonce).
fn classify_send_error(message: String) -> ChainClientError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("insufficient funds") {
        ChainClientError::InsufficientFunds(message)
    } else if lowered.contains("revert") {
        ChainClientError::Reverted(message)
    } else {
        ChainClientError::RpcError(message)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract error: {0}")]
    ContractError(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_errors_are_classified() {
        assert!(matches!(
            classify_send_error("insufficient funds for gas * price + value".into()),
            ChainClientError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_send_error("execution reverted: ERC20: transfer amount exceeds balance".into()),
            ChainClientError::Reverted(_)
        ));
        assert!(matches!(
            classify_send_error("connection timed out".into()),
            ChainClientError::RpcError(_)
        ));
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(parse_address("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174").is_ok());
        assert!(parse_address("not-an-address").is_err());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use serde::{Deserialize, Serialize};

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
    /// Settlement token (USD-pegged, 6 decimals)
    pub settlement_token: Erc20Token,
    /// Cross-chain bridge wiring
    pub bridge: BridgeConfig,
}

/// Stargate/LayerZero bridge configuration for a network.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stargate router contract
    pub router_address: &'static str,
    /// LayerZero chain id of the fixed destination chain (Ethereum)
    pub dst_chain_id: u16,
    /// Stargate source pool id (USDC)
    pub src_pool_id: u64,
    /// Stargate destination pool id (USDC)
    pub dst_pool_id: u64,
    /// Message status explorer API base
    pub status_api_url: &'static str,
}

/// Polygon PoS mainnet configuration.
pub const POLYGON_MAINNET: NetworkConfig = NetworkConfig {
    name: "Polygon PoS",
    chain_id: 137,
    rpc_url: "https://polygon-rpc.com",
    explorer_url: "https://polygonscan.com",
    settlement_token: USDC_POLYGON,
    bridge: BridgeConfig {
        router_address: "0x45A01E4e04F14f7A4a6702c74187c5F6222033cd",
        dst_chain_id: 101,
        src_pool_id: 1,
        dst_pool_id: 1,
        status_api_url: "https://api-mainnet.layerzero-scan.com",
    },
};

/// Polygon Amoy testnet configuration.
pub const POLYGON_AMOY: NetworkConfig = NetworkConfig {
    name: "Polygon Amoy Testnet",
    chain_id: 80002,
    rpc_url: "https://rpc-amoy.polygon.technology",
    explorer_url: "https://amoy.polygonscan.com",
    settlement_token: USDC_AMOY,
    bridge: BridgeConfig {
        router_address: "0x817436a076060D158204d955E5403b6Ed0A5fac0",
        dst_chain_id: 10161,
        src_pool_id: 1,
        dst_pool_id: 1,
        status_api_url: "https://api-testnet.layerzero-scan.com",
    },
};

/// An ERC-20 token the engine settles in.
#[derive(Debug, Clone)]
pub struct Erc20Token {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    pub address: &'static str,
}

/// USDC on Polygon PoS mainnet.
pub const USDC_POLYGON: Erc20Token = Erc20Token {
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
    address: "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
};

/// Test USDC on Polygon Amoy.
pub const USDC_AMOY: Erc20Token = Erc20Token {
    symbol: "USDC",
    name: "USD Coin (test)",
    decimals: 6,
    address: "0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582",
};

/// Token balance information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token symbol (e.g., "POL", "USDC")
    pub symbol: String,
    /// Balance in smallest unit (wei for native, token decimals for ERC-20)
    pub balance_raw: String,
    /// Balance formatted with decimals
    pub balance_formatted: String,
    /// Number of decimals
    pub decimals: u8,
    /// Contract address (None for native token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

/// Format a raw balance with the specified number of decimals.
pub fn format_balance(balance: alloy::primitives::U256, decimals: u8) -> String {
    use alloy::primitives::U256;

    if balance.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = balance / divisor;
    let remainder = balance % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        // Format with up to 6 decimal places
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, &trimmed[..trimmed.len().min(6)])
        }
    }
}

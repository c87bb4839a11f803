// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 token contract interactions.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, U256},
    providers::Provider,
    sol,
    sol_types::SolCall,
};

use super::client::ChainClientError;
use super::types::{format_balance, TokenBalance};

// The subset of the ERC-20 interface the engine needs
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// ABI-encoded `transfer(to, amount)` calldata.
pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

/// ERC-20 contract wrapper.
pub struct Erc20Contract<P> {
    contract: IERC20::IERC20Instance<P>,
    address: Address,
}

impl<P: Provider + Clone> Erc20Contract<P> {
    /// Create a new ERC-20 contract instance.
    pub fn new(provider: &P, contract_address: &str) -> Result<Self, ChainClientError> {
        let address = Address::from_str(contract_address)
            .map_err(|e| ChainClientError::InvalidAddress(e.to_string()))?;

        let contract = IERC20::new(address, provider.clone());

        Ok(Self { contract, address })
    }

    /// Get the token decimals from the chain; never hard-assumed.
    pub async fn decimals(&self) -> Result<u8, ChainClientError> {
        self.contract
            .decimals()
            .call()
            .await
            .map_err(|e| ChainClientError::ContractError(e.to_string()))
    }

    /// Get the balance of an address, scaled by the token's decimals.
    pub async fn balance_of(
        &self,
        wallet_address: &str,
        symbol: &str,
    ) -> Result<TokenBalance, ChainClientError> {
        let addr = Address::from_str(wallet_address)
            .map_err(|e| ChainClientError::InvalidAddress(e.to_string()))?;

        let decimals = self.decimals().await?;

        let balance: U256 = self
            .contract
            .balanceOf(addr)
            .call()
            .await
            .map_err(|e| ChainClientError::ContractError(e.to_string()))?;

        Ok(TokenBalance {
            symbol: symbol.to_string(),
            balance_raw: balance.to_string(),
            balance_formatted: format_balance(balance, decimals),
            decimals,
            contract_address: Some(self.address.to_checksum(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_calldata_layout() {
        let to = Address::from_str("0x2222222222222222222222222222222222222222").unwrap();
        let data = transfer_calldata(to, U256::from(1_500_000u64));

        // 4-byte selector + two 32-byte words
        assert_eq!(data.len(), 4 + 32 + 32);
        // transfer(address,uint256) selector
        assert_eq!(data[..4], [0xa9, 0x05, 0x9c, 0xbb]);
        // recipient is right-aligned in the first word
        assert_eq!(&data[16..36], to.as_slice());
    }
}

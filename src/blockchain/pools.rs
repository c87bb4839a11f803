// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Treasury pool wallet registry.
//!
//! Pool addresses are never persisted: each is derived on demand from the
//! pool's KMS key version. Derivation is deterministic, so a small LRU
//! cache with TTL fronts the KMS round-trip.
//!
//! Balance queries are dashboard-path reads and degrade to a zero
//! sentinel when the node or KMS is unreachable. Signing paths
//! (`address_for`) never degrade; they surface the error.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ConfigError, PoolKeys};

use super::client::ChainClient;
use super::signer::{KeySigner, SignerError};
use super::types::{Erc20Token, TokenBalance};

/// Cached derived addresses per key version.
const ADDRESS_CACHE_CAPACITY: usize = 8;
const ADDRESS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// The closed set of treasury pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Consumer,
    Affiliate,
    Wholesale,
}

impl Pool {
    pub const ALL: [Pool; 3] = [Pool::Consumer, Pool::Affiliate, Pool::Wholesale];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Consumer => "consumer",
            Pool::Affiliate => "affiliate",
            Pool::Wholesale => "wholesale",
        }
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Pool {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consumer" => Ok(Pool::Consumer),
            "affiliate" => Ok(Pool::Affiliate),
            "wholesale" => Ok(Pool::Wholesale),
            other => Err(ConfigError::InvalidValue {
                name: "pool".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One submission lock per pool.
///
/// Plain transfers and bridge swaps from the same pool spend the same
/// nonce sequence, so both hold this lock from nonce fetch through
/// broadcast. Reads are never serialized.
pub struct PoolLocks {
    locks: HashMap<Pool, tokio::sync::Mutex<()>>,
}

impl PoolLocks {
    pub fn new() -> Self {
        Self {
            locks: Pool::ALL
                .iter()
                .map(|p| (*p, tokio::sync::Mutex::new(())))
                .collect(),
        }
    }

    pub async fn acquire(&self, pool: Pool) -> tokio::sync::MutexGuard<'_, ()> {
        self.locks[&pool].lock().await
    }
}

impl Default for PoolLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached entry: derived address + insertion timestamp.
struct CacheEntry {
    address: Address,
    inserted_at: Instant,
}

/// Maps logical pool names to KMS key versions and derived addresses.
pub struct PoolWalletRegistry {
    signer: Arc<KeySigner>,
    chain: Arc<ChainClient>,
    pool_keys: PoolKeys,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl PoolWalletRegistry {
    pub fn new(signer: Arc<KeySigner>, chain: Arc<ChainClient>, pool_keys: PoolKeys) -> Self {
        Self {
            signer,
            chain,
            pool_keys,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(ADDRESS_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// KMS key version path for a pool.
    pub fn key_version(&self, pool: Pool) -> &str {
        match pool {
            Pool::Consumer => &self.pool_keys.consumer,
            Pool::Affiliate => &self.pool_keys.affiliate,
            Pool::Wholesale => &self.pool_keys.wholesale,
        }
    }

    /// Resolve a pool's on-chain address by deriving it from the pool's
    /// KMS public key. Deterministic: the same key version always yields
    /// the same address.
    pub async fn address_for(&self, pool: Pool) -> Result<Address, SignerError> {
        let key_version = self.key_version(pool).to_string();

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(entry) = cache.get(&key_version) {
                if entry.inserted_at.elapsed() < ADDRESS_CACHE_TTL {
                    return Ok(entry.address);
                }
                cache.pop(&key_version);
            }
        }

        let address = self.signer.address_for_key(&key_version).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                key_version,
                CacheEntry {
                    address,
                    inserted_at: Instant::now(),
                },
            );
        }

        Ok(address)
    }

    /// Native balance of a pool wallet. Degrades to a zero sentinel on
    /// node/KMS errors.
    pub async fn native_balance(&self, pool: Pool) -> TokenBalance {
        let address = match self.address_for(pool).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(pool = %pool, error = %e, "pool address derivation failed; reporting zero balance");
                return zero_balance("POL", 18, None);
            }
        };

        match self.chain.native_balance(&address.to_checksum(None)).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(pool = %pool, error = %e, "native balance query failed; reporting zero balance");
                zero_balance("POL", 18, None)
            }
        }
    }

    /// ERC-20 balance of a pool wallet, scaled by the token's on-chain
    /// decimals. Degrades to a zero sentinel on node/KMS errors.
    pub async fn token_balance(&self, pool: Pool, token: &Erc20Token) -> TokenBalance {
        let address = match self.address_for(pool).await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(pool = %pool, token = token.symbol, error = %e, "pool address derivation failed; reporting zero balance");
                return zero_balance(token.symbol, token.decimals, Some(token.address));
            }
        };

        match self
            .chain
            .token_balance(&address.to_checksum(None), token)
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                warn!(pool = %pool, token = token.symbol, error = %e, "token balance query failed; reporting zero balance");
                zero_balance(token.symbol, token.decimals, Some(token.address))
            }
        }
    }
}

fn zero_balance(symbol: &str, decimals: u8, contract: Option<&str>) -> TokenBalance {
    TokenBalance {
        symbol: symbol.to_string(),
        balance_raw: "0".to_string(),
        balance_formatted: "0".to_string(),
        decimals,
        contract_address: contract.map(|c| c.to_string()),
    }
}

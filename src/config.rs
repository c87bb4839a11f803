// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names and startup loading for the engine.
//! Configuration is read once at process start ([`EngineConfig::from_env`])
//! and passed by handle into each component; no module-level globals.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TREASURY_NETWORK` | Network selector (`mainnet` or `testnet`) | `testnet` |
//! | `CHAIN_RPC_URL` | Chain RPC endpoint override | network default |
//! | `KMS_ENDPOINT` | Cloud KMS REST base URL | `https://cloudkms.googleapis.com` |
//! | `KMS_ACCESS_TOKEN` | Bearer token for the KMS REST API | Required |
//! | `CONSUMER_POOL_KEY_VERSION` | KMS key version path for the consumer pool | Required |
//! | `AFFILIATE_POOL_KEY_VERSION` | KMS key version path for the affiliate pool | Required |
//! | `WHOLESALE_POOL_KEY_VERSION` | KMS key version path for the wholesale pool | Required |
//! | `SUNSET_VOLUME_THRESHOLD_CENTS` | Sunset monthly-volume threshold override | `1000000000` ($10M) |
//! | `LEDGER_DB_PATH` | Embedded ledger database file | `/data/ledger.redb` |

use std::env;
use std::path::PathBuf;

use crate::blockchain::types::{NetworkConfig, POLYGON_AMOY, POLYGON_MAINNET};
use crate::models::{Amount, DEFAULT_SUNSET_THRESHOLD};

pub const NETWORK_ENV: &str = "TREASURY_NETWORK";
pub const RPC_URL_ENV: &str = "CHAIN_RPC_URL";
pub const KMS_ENDPOINT_ENV: &str = "KMS_ENDPOINT";
pub const KMS_ACCESS_TOKEN_ENV: &str = "KMS_ACCESS_TOKEN";
pub const CONSUMER_POOL_KEY_ENV: &str = "CONSUMER_POOL_KEY_VERSION";
pub const AFFILIATE_POOL_KEY_ENV: &str = "AFFILIATE_POOL_KEY_VERSION";
pub const WHOLESALE_POOL_KEY_ENV: &str = "WHOLESALE_POOL_KEY_VERSION";
pub const SUNSET_THRESHOLD_ENV: &str = "SUNSET_VOLUME_THRESHOLD_CENTS";
pub const LEDGER_DB_PATH_ENV: &str = "LEDGER_DB_PATH";

const DEFAULT_LEDGER_DB_PATH: &str = "/data/ledger.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    MissingConfig(String),

    #[error("invalid configuration value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// KMS key version path per treasury pool.
///
/// Paths follow the Cloud KMS format
/// `projects/{p}/locations/{l}/keyRings/{r}/cryptoKeys/{k}/cryptoKeyVersions/{v}`.
#[derive(Debug, Clone)]
pub struct PoolKeys {
    pub consumer: String,
    pub affiliate: String,
    pub wholesale: String,
}

/// Engine-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    /// RPC endpoint; defaults to the selected network's public endpoint.
    pub rpc_url: String,
    pub pool_keys: PoolKeys,
    pub sunset_threshold: Amount,
    pub ledger_db_path: PathBuf,
}

impl EngineConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let network_name = env_or_default(NETWORK_ENV, "testnet").to_ascii_lowercase();
        let network = match network_name.as_str() {
            "mainnet" => POLYGON_MAINNET,
            "testnet" => POLYGON_AMOY,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: NETWORK_ENV.to_string(),
                    value: other.to_string(),
                })
            }
        };
        let rpc_url = env_or_default(RPC_URL_ENV, network.rpc_url);

        let pool_keys = PoolKeys {
            consumer: env_required(CONSUMER_POOL_KEY_ENV)?,
            affiliate: env_required(AFFILIATE_POOL_KEY_ENV)?,
            wholesale: env_required(WHOLESALE_POOL_KEY_ENV)?,
        };

        let sunset_threshold = match env::var(SUNSET_THRESHOLD_ENV) {
            Ok(raw) => {
                let cents: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    name: SUNSET_THRESHOLD_ENV.to_string(),
                    value: raw.clone(),
                })?;
                Amount::from_cents(cents)
            }
            Err(_) => DEFAULT_SUNSET_THRESHOLD,
        };

        let ledger_db_path =
            PathBuf::from(env_or_default(LEDGER_DB_PATH_ENV, DEFAULT_LEDGER_DB_PATH));

        Ok(Self {
            network,
            rpc_url,
            pool_keys,
            sunset_threshold,
            ledger_db_path,
        })
    }
}

pub(crate) fn env_required(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingConfig(name.to_string()))
}

pub(crate) fn env_or_default(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

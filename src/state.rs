// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Engine wiring: every client is constructed once at process start and
//! passed by handle into the components that need it. No module-level
//! singletons, so tests substitute doubles at the `RemoteSigner` seam
//! and multiple stateless instances behave identically.

use std::sync::Arc;

use crate::affiliate::AffiliateChipLedger;
use crate::blockchain::{
    BridgeGateway, ChainClient, ChainClientError, KeySigner, Pool, PoolLocks, PoolWalletRegistry,
    TransferExecutor,
};
use crate::config::EngineConfig;
use crate::distribution::DistributionEngine;
use crate::kms::RemoteSigner;
use crate::storage::{LedgerDb, LedgerDbError};

#[derive(Debug, thiserror::Error)]
pub enum EngineInitError {
    #[error(transparent)]
    Chain(#[from] ChainClientError),

    #[error(transparent)]
    Db(#[from] LedgerDbError),
}

/// Shared engine state handed to the (external) API and scheduler layers.
#[derive(Clone)]
pub struct EngineState {
    pub chain: Arc<ChainClient>,
    pub signer: Arc<KeySigner>,
    pub registry: Arc<PoolWalletRegistry>,
    pub transfers: Arc<TransferExecutor>,
    pub bridge: Arc<BridgeGateway>,
    pub db: Arc<LedgerDb>,
    pub distribution: Arc<DistributionEngine>,
    pub affiliate: Arc<AffiliateChipLedger>,
}

impl EngineState {
    /// Wire the engine from configuration and a remote signer.
    pub fn new(
        config: &EngineConfig,
        remote: Arc<dyn RemoteSigner>,
    ) -> Result<Self, EngineInitError> {
        let chain = Arc::new(ChainClient::new(config.network.clone(), &config.rpc_url)?);
        let signer = Arc::new(KeySigner::new(remote));
        let registry = Arc::new(PoolWalletRegistry::new(
            signer.clone(),
            chain.clone(),
            config.pool_keys.clone(),
        ));
        let locks = Arc::new(PoolLocks::new());

        let transfers = Arc::new(TransferExecutor::new(
            chain.clone(),
            signer.clone(),
            registry.clone(),
            locks.clone(),
        ));
        // Bridge swaps are funded by the consumer pool
        let bridge = Arc::new(BridgeGateway::new(
            chain.clone(),
            signer.clone(),
            registry.clone(),
            locks,
            Pool::Consumer,
        ));

        let db = Arc::new(LedgerDb::open(&config.ledger_db_path)?);
        let distribution = Arc::new(DistributionEngine::new(db.clone()));
        let affiliate = Arc::new(AffiliateChipLedger::new(
            db.clone(),
            config.sunset_threshold,
        ));

        Ok(Self {
            chain,
            signer,
            registry,
            transfers,
            bridge,
            db,
            distribution,
            affiliate,
        })
    }
}

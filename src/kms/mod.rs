// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Remote Signer (Cloud KMS)
//!
//! Private key material never exists in this process. All signing is
//! delegated to a remote key-management service through the
//! [`RemoteSigner`] trait; the production implementation is the Cloud KMS
//! REST client in [`google`].
//!
//! The trait seam exists so a future signer that returns a recovery id can
//! replace the brute-force search in `blockchain::signer` without touching
//! callers, and so tests can substitute a local in-process double.

pub mod google;

pub use google::GoogleKms;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("KMS configuration missing: {0}")]
    MissingConfig(String),

    #[error("KMS request failed: {0}")]
    Request(String),

    #[error("KMS response was invalid: {0}")]
    InvalidResponse(String),
}

/// Remote asymmetric-signing service.
///
/// `key_version` is a full Cloud KMS key version path:
/// `projects/{p}/locations/{l}/keyRings/{r}/cryptoKeys/{k}/cryptoKeyVersions/{v}`.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Fetch the PEM-encoded public key for a key version.
    async fn get_public_key(&self, key_version: &str) -> Result<String, KmsError>;

    /// Sign a 32-byte digest; returns the DER-encoded ECDSA signature.
    ///
    /// The service does not return a recovery id.
    async fn sign_digest(&self, key_version: &str, digest: &[u8; 32]) -> Result<Vec<u8>, KmsError>;
}

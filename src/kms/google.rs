// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google Cloud KMS REST client for asymmetric signing.
//!
//! Uses the `publicKey` and `asymmetricSign` endpoints of the Cloud KMS
//! v1 API. The signing key algorithm is expected to be
//! `EC_SIGN_SECP256K1_SHA256`; the engine passes the 32-byte transaction
//! digest in the request's `sha256` digest field.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::{env_or_default, env_required, KMS_ACCESS_TOKEN_ENV, KMS_ENDPOINT_ENV};

use super::{KmsError, RemoteSigner};

const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";

/// Bounded timeout for KMS calls; a timed-out signing call fails the
/// whole signing operation.
const KMS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GoogleKms {
    endpoint: String,
    access_token: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    pem: String,
}

#[derive(Debug, Deserialize)]
struct AsymmetricSignResponse {
    signature: String,
}

impl GoogleKms {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Result<Self, KmsError> {
        let http = Client::builder()
            .timeout(KMS_TIMEOUT)
            .build()
            .map_err(|e| KmsError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            http,
        })
    }

    /// Build a client from `KMS_ENDPOINT` / `KMS_ACCESS_TOKEN`.
    ///
    /// Token refresh (workload identity, metadata server) is the
    /// deployment's concern, not this client's.
    pub fn from_env() -> Result<Self, KmsError> {
        let endpoint = env_or_default(KMS_ENDPOINT_ENV, DEFAULT_KMS_ENDPOINT);
        let access_token = env_required(KMS_ACCESS_TOKEN_ENV)
            .map_err(|e| KmsError::MissingConfig(e.to_string()))?;
        Self::new(endpoint, access_token)
    }
}

#[async_trait]
impl RemoteSigner for GoogleKms {
    async fn get_public_key(&self, key_version: &str) -> Result<String, KmsError> {
        let url = format!("{}/v1/{}/publicKey", self.endpoint, key_version);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| KmsError::Request(format!("publicKey request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KmsError::Request(format!(
                "publicKey returned {status}: {body}"
            )));
        }

        let parsed: PublicKeyResponse = response
            .json()
            .await
            .map_err(|e| KmsError::InvalidResponse(format!("publicKey body: {e}")))?;

        Ok(parsed.pem)
    }

    async fn sign_digest(&self, key_version: &str, digest: &[u8; 32]) -> Result<Vec<u8>, KmsError> {
        let url = format!("{}/v1/{}:asymmetricSign", self.endpoint, key_version);
        let payload = json!({
            "digest": {
                "sha256": Base64::encode_string(digest),
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| KmsError::Request(format!("asymmetricSign request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KmsError::Request(format!(
                "asymmetricSign returned {status}: {body}"
            )));
        }

        let parsed: AsymmetricSignResponse = response
            .json()
            .await
            .map_err(|e| KmsError::InvalidResponse(format!("asymmetricSign body: {e}")))?;

        Base64::decode_vec(&parsed.signature)
            .map_err(|e| KmsError::InvalidResponse(format!("signature base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_encodes_as_standard_base64() {
        let digest = [0xABu8; 32];
        let encoded = Base64::encode_string(&digest);
        assert_eq!(base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &encoded).unwrap(), digest);
    }

    #[test]
    fn client_construction_does_not_require_network() {
        let kms = GoogleKms::new("https://cloudkms.googleapis.com", "token");
        assert!(kms.is_ok());
    }
}

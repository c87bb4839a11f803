// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction signing against the remote KMS.
//!
//! The KMS holds the pool keys and signs 32-byte digests; it returns a
//! plain DER (r, s) signature with no recovery id. This module bridges
//! that gap: it derives the pool address from the KMS public key,
//! normalizes the signature to low-s form (EIP-2), searches the two
//! candidate recovery ids for the one that recovers the expected signer,
//! and assembles the EIP-155 signed transaction bytes.
//!
//! Every step is fatal on failure. A transaction is either fully signed
//! and verified against the expected pool address, or nothing is returned
//! for broadcast.

use std::sync::Arc;

use alloy::{
    consensus::{SignableTransaction, TxLegacy},
    eips::eip2718::Encodable2718,
    primitives::{keccak256, Address, Signature, B256, U256},
};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::DecodePublicKey;

use crate::kms::{KmsError, RemoteSigner};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("remote signer error: {0}")]
    Kms(#[from] KmsError),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("neither recovery id candidate recovers expected signer {expected}")]
    RecoveryMismatch { expected: String },

    #[error("transaction is missing a chain id")]
    MissingChainId,
}

/// Signs transactions with keys held by the remote KMS.
pub struct KeySigner {
    remote: Arc<dyn RemoteSigner>,
}

impl KeySigner {
    pub fn new(remote: Arc<dyn RemoteSigner>) -> Self {
        Self { remote }
    }

    /// Fetch the uncompressed (0x04-prefixed, 65-byte) public key for a
    /// KMS key version.
    pub async fn public_key(&self, key_version: &str) -> Result<[u8; 65], SignerError> {
        let pem = self.remote.get_public_key(key_version).await?;

        let public_key = k256::PublicKey::from_public_key_pem(&pem)
            .map_err(|e| SignerError::InvalidPublicKey(format!("PEM parse: {e}")))?;

        let point = public_key.to_encoded_point(false);
        point
            .as_bytes()
            .try_into()
            .map_err(|_| SignerError::InvalidPublicKey("not an uncompressed point".to_string()))
    }

    /// Derive the on-chain address for a KMS key version.
    pub async fn address_for_key(&self, key_version: &str) -> Result<Address, SignerError> {
        let public_key = self.public_key(key_version).await?;
        derive_address(&public_key)
    }

    /// Sign a 32-byte digest with the remote key; parses the returned DER
    /// signature.
    pub async fn sign_digest(
        &self,
        key_version: &str,
        digest: B256,
    ) -> Result<EcdsaSignature, SignerError> {
        let der = self.remote.sign_digest(key_version, &digest.0).await?;
        EcdsaSignature::from_der(&der)
            .map_err(|e| SignerError::InvalidSignature(format!("DER parse: {e}")))
    }

    /// Sign a legacy transaction and return the raw RLP bytes ready for
    /// broadcast. `expected` must be the address derived from the same
    /// key version; the recovered signer is verified against it before
    /// any bytes are returned.
    pub async fn sign_transaction(
        &self,
        key_version: &str,
        expected: Address,
        tx: TxLegacy,
    ) -> Result<Vec<u8>, SignerError> {
        if tx.chain_id.is_none() {
            return Err(SignerError::MissingChainId);
        }

        let digest = tx.signature_hash();
        let ecdsa_sig = self.sign_digest(key_version, digest).await?;
        let signature = normalize_and_recover(&ecdsa_sig, digest, expected)?;

        let signed = tx.into_signed(signature);
        Ok(signed.encoded_2718())
    }
}

/// Derive the chain address from an uncompressed secp256k1 public key:
/// keccak256 of the 64-byte X and Y coordinates, last 20 bytes.
///
/// Pure and deterministic: identical input bytes always yield the
/// identical address.
pub fn derive_address(public_key: &[u8]) -> Result<Address, SignerError> {
    if public_key.len() != 65 || public_key[0] != 0x04 {
        return Err(SignerError::InvalidPublicKey(format!(
            "expected 65-byte uncompressed point, got {} bytes",
            public_key.len()
        )));
    }

    let hash = keccak256(&public_key[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Normalize a raw (r, s) signature and resolve its recovery id.
///
/// Enforces low-s (EIP-2), then tries both candidate recovery ids,
/// accepting the one whose recovered address equals `expected`
/// (addresses compare as raw bytes, so the match is case-insensitive by
/// construction). The KMS gives no hint which candidate is correct and
/// neither is assumed.
pub fn normalize_and_recover(
    signature: &EcdsaSignature,
    digest: B256,
    expected: Address,
) -> Result<Signature, SignerError> {
    let normalized = signature.normalize_s().unwrap_or(*signature);

    let r = U256::from_be_slice(&normalized.r().to_bytes());
    let s = U256::from_be_slice(&normalized.s().to_bytes());

    for y_parity in [false, true] {
        let recovery_id = RecoveryId::new(y_parity, false);
        let Ok(verifying_key) =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &normalized, recovery_id)
        else {
            continue;
        };

        let candidate = derive_address(verifying_key.to_encoded_point(false).as_bytes())?;
        if candidate == expected {
            return Ok(Signature::new(r, s, y_parity));
        }
    }

    Err(SignerError::RecoveryMismatch {
        expected: expected.to_checksum(None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, TxKind};
    use async_trait::async_trait;
    use k256::ecdsa::signature::hazmat::PrehashSigner;
    use k256::ecdsa::SigningKey;
    use k256::pkcs8::EncodePublicKey;

    /// In-process stand-in for the KMS: a local secp256k1 key that, like
    /// the real service, returns PEM public keys and DER signatures with
    /// no recovery id.
    struct LocalRemote {
        key: SigningKey,
    }

    impl LocalRemote {
        fn new(seed: u8) -> Self {
            let mut bytes = [0u8; 32];
            bytes[31] = seed;
            Self {
                key: SigningKey::from_slice(&bytes).unwrap(),
            }
        }

        fn address(&self) -> Address {
            let point = self.key.verifying_key().to_encoded_point(false);
            derive_address(point.as_bytes()).unwrap()
        }
    }

    #[async_trait]
    impl RemoteSigner for LocalRemote {
        async fn get_public_key(&self, _key_version: &str) -> Result<String, KmsError> {
            Ok(self
                .key
                .verifying_key()
                .to_public_key_pem(k256::pkcs8::LineEnding::LF)
                .unwrap())
        }

        async fn sign_digest(
            &self,
            _key_version: &str,
            digest: &[u8; 32],
        ) -> Result<Vec<u8>, KmsError> {
            let sig: EcdsaSignature = self.key.sign_prehash(digest).unwrap();
            Ok(sig.to_der().as_bytes().to_vec())
        }
    }

    fn test_tx(chain_id: Option<u64>) -> TxLegacy {
        TxLegacy {
            chain_id,
            nonce: 7,
            gas_price: 30_000_000_000,
            gas_limit: 90_000,
            to: TxKind::Call(Address::repeat_byte(0x22)),
            value: U256::ZERO,
            input: Bytes::new(),
        }
    }

    #[test]
    fn derive_address_known_vector() {
        // Private key 0x...01 → the classic test address
        let remote = LocalRemote::new(1);
        assert_eq!(
            remote.address().to_checksum(None),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn derive_address_is_pure() {
        let remote = LocalRemote::new(9);
        let point = remote.key.verifying_key().to_encoded_point(false);
        let a = derive_address(point.as_bytes()).unwrap();
        let b = derive_address(point.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_address_rejects_compressed_points() {
        let remote = LocalRemote::new(3);
        let compressed = remote.key.verifying_key().to_encoded_point(true);
        assert!(matches!(
            derive_address(compressed.as_bytes()),
            Err(SignerError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn distinct_keys_yield_distinct_addresses() {
        assert_ne!(LocalRemote::new(1).address(), LocalRemote::new(2).address());
    }

    #[tokio::test]
    async fn public_key_round_trips_through_pem() {
        let remote = LocalRemote::new(5);
        let expected = remote.address();
        let signer = KeySigner::new(Arc::new(remote));

        let public_key = signer.public_key("key-5").await.unwrap();
        assert_eq!(public_key[0], 0x04);
        assert_eq!(derive_address(&public_key).unwrap(), expected);
    }

    #[tokio::test]
    async fn recover_finds_a_candidate_and_stays_low_s() {
        let remote = LocalRemote::new(11);
        let expected = remote.address();
        let signer = KeySigner::new(Arc::new(remote));

        let digest = keccak256(b"payout batch 2026-W31");
        let sig = signer.sign_digest("key-11", digest).await.unwrap();

        let resolved = normalize_and_recover(&sig, digest, expected).unwrap();

        // s must sit in the lower half of the curve order
        let half_order = U256::from_be_slice(&[
            0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46,
            0x68, 0x1b, 0x20, 0xa0,
        ]);
        assert!(resolved.s() <= half_order);
    }

    #[tokio::test]
    async fn recover_normalizes_high_s_inputs() {
        let remote = LocalRemote::new(13);
        let expected = remote.address();
        let digest = keccak256(b"high-s normalization");

        let sig: EcdsaSignature = remote.key.sign_prehash(digest.as_slice()).unwrap();

        // Flip s into the upper half (the network would reject this form)
        let neg_s = -*sig.s();
        let high_s =
            EcdsaSignature::from_scalars(sig.r().to_bytes(), neg_s.to_bytes()).unwrap();

        let from_low = normalize_and_recover(&sig, digest, expected).unwrap();
        let from_high = normalize_and_recover(&high_s, digest, expected).unwrap();
        assert_eq!(from_low.s(), from_high.s());
    }

    #[tokio::test]
    async fn recover_fails_for_wrong_expected_address() {
        let remote = LocalRemote::new(17);
        let signer = KeySigner::new(Arc::new(remote));

        let digest = keccak256(b"mismatch");
        let sig = signer.sign_digest("key-17", digest).await.unwrap();

        let wrong = Address::repeat_byte(0x99);
        assert!(matches!(
            normalize_and_recover(&sig, digest, wrong),
            Err(SignerError::RecoveryMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn sign_transaction_requires_chain_id() {
        let remote = LocalRemote::new(19);
        let expected = remote.address();
        let signer = KeySigner::new(Arc::new(remote));

        let result = signer
            .sign_transaction("key-19", expected, test_tx(None))
            .await;
        assert!(matches!(result, Err(SignerError::MissingChainId)));
    }

    #[tokio::test]
    async fn sign_transaction_produces_rlp_bytes() {
        let remote = LocalRemote::new(23);
        let expected = remote.address();
        let signer = KeySigner::new(Arc::new(remote));

        let raw = signer
            .sign_transaction("key-23", expected, test_tx(Some(137)))
            .await
            .unwrap();

        // Legacy transaction: RLP list header
        assert!(raw[0] >= 0xf7);

        // Deterministic for identical inputs
        let again = signer
            .sign_transaction("key-23", expected, test_tx(Some(137)))
            .await
            .unwrap();
        assert_eq!(raw, again);
    }

    #[tokio::test]
    async fn sign_transaction_refuses_wrong_pool_address() {
        let remote = LocalRemote::new(29);
        let signer = KeySigner::new(Arc::new(remote));

        let result = signer
            .sign_transaction("key-29", Address::repeat_byte(0x01), test_tx(Some(137)))
            .await;
        assert!(matches!(result, Err(SignerError::RecoveryMismatch { .. })));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing credentials for custodial and treasury addresses.
//!
//! Keys are stored as PKCS#8 PEM. A [`SigningCredential`] is only ever lent
//! to the gateway for a single transfer; the alloy signer built from it is
//! dropped when that call returns.

use alloy::{network::EthereumWallet, primitives::Address, signers::local::PrivateKeySigner};
use k256::{
    ecdsa::SigningKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
    SecretKey,
};

/// Errors raised while decoding or generating key material.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// PEM-encoded secp256k1 private key able to authorize transfers.
///
/// Not `Clone`, and `Debug` never prints the key.
pub struct SigningCredential {
    pem: Vec<u8>,
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("pem", &"<redacted>")
            .finish()
    }
}

impl SigningCredential {
    /// Wrap PEM bytes as read from custody storage.
    pub fn from_pem(pem: Vec<u8>) -> Self {
        Self { pem }
    }

    /// Build a credential from a hex private key (with or without `0x`).
    pub fn from_hex(private_key_hex: &str) -> Result<Self, SigningError> {
        let raw = private_key_hex.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let key_bytes = alloy::hex::decode(raw)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
        let pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_pem(pem.as_bytes().to_vec()))
    }

    /// Generate a fresh keypair, returning the credential and its EVM address.
    pub fn generate() -> Result<(Self, String), SigningError> {
        use k256::elliptic_curve::rand_core::OsRng;

        let signing_key = SigningKey::random(&mut OsRng);
        let private_key_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SigningError::KeyGeneration(e.to_string()))?;
        let address = address_of(&signing_key);

        Ok((Self::from_pem(private_key_pem.as_bytes().to_vec()), address))
    }

    /// Raw PEM bytes, for persisting.
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Build an alloy signer for one signing call.
    pub fn signer(&self) -> Result<PrivateKeySigner, SigningError> {
        let secret_key = parse_secret_key(&self.pem)?;
        PrivateKeySigner::from_slice(&secret_key.to_bytes())
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))
    }

    /// Wallet for a signing provider.
    pub fn wallet(&self) -> Result<EthereumWallet, SigningError> {
        Ok(EthereumWallet::from(self.signer()?))
    }

    /// Address controlled by this key.
    pub fn address(&self) -> Result<Address, SigningError> {
        Ok(self.signer()?.address())
    }
}

/// Parse a SEC1 or PKCS#8 PEM private key.
fn parse_secret_key(pem_bytes: &[u8]) -> Result<SecretKey, SigningError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;
    let pem = pem::parse(pem_str)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    SecretKey::from_pkcs8_der(pem.contents())
        .or_else(|_| SecretKey::from_sec1_der(pem.contents()))
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid key format: {}", e)))
}

/// Lowercase hex EVM address of a signing key.
fn address_of(signing_key: &SigningKey) -> String {
    use alloy::primitives::keccak256;

    let public_key_uncompressed = signing_key.verifying_key().to_encoded_point(false);
    let public_key_bytes = public_key_uncompressed.as_bytes();
    let hash = keccak256(&public_key_bytes[1..]);
    format!("0x{}", alloy::hex::encode(&hash[12..]))
}

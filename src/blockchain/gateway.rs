// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain gateway abstraction used by the settlement engine.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::signing::{SigningCredential, SigningError};
use super::types::TransferReceipt;

/// Errors surfaced by a chain gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid address: {0}")]
    AddressInvalid(String),

    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    #[error("Insufficient on-chain funds: have {available} wei, need {required} wei")]
    InsufficientOnChainFunds { available: U256, required: U256 },

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
}

impl From<SigningError> for GatewayError {
    fn from(e: SigningError) -> Self {
        GatewayError::InvalidCredential(e.to_string())
    }
}

/// Read balances and move native value on an EVM chain.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Check that `address` is a well-formed address for this chain.
    fn validate_address(&self, address: &str) -> Result<Address, GatewayError> {
        parse_address(address)
    }

    /// Native balance of `address`, in wei.
    async fn get_balance(&self, address: &str) -> Result<U256, GatewayError>;

    /// Send `amount` wei to `to`, signed by `credential`.
    ///
    /// Returns once the node has accepted the transaction.
    async fn transfer(
        &self,
        credential: &SigningCredential,
        to: &str,
        amount: U256,
    ) -> Result<TransferReceipt, GatewayError>;
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(address: &str) -> Result<Address, GatewayError> {
    let trimmed = address.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(GatewayError::AddressInvalid(address.to_string()));
    }
    Address::from_str(trimmed).map_err(|e| GatewayError::AddressInvalid(format!("{address}: {e}")))
}

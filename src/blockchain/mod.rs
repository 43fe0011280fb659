// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration for native-asset transfers on an EVM chain.
//!
//! This module provides functionality for:
//! - Querying native balances of custodial addresses
//! - Signing and broadcasting value transfers
//! - Decoding and generating custodial signing keys

pub mod client;
pub mod gateway;
pub mod signing;
pub mod types;

pub use client::EvmGateway;
pub use gateway::{parse_address, ChainGateway, GatewayError};
pub use signing::{SigningCredential, SigningError};
pub use types::*;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request bodies accepted by the REST API. Responses reuse the domain types
//! (`AccountSummary`, `SettlementReceipt`, `SettlementOperation`), which
//! already derive `Serialize` and `ToSchema`.
//!
//! Money is always a JSON **string** (`"100.25"`), never a JSON number, so no
//! client or server float parsing touches a ledger amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Header carrying the client's idempotency key on money-moving requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Longest accepted idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Request to debit the ledger and pay the value out on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    /// Destination EVM address (`0x` + 40 hex characters).
    #[schema(example = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")]
    pub destination: String,
    /// Amount in the ledger currency, as a decimal string.
    #[serde(with = "rust_decimal::serde::str")]
    #[schema(value_type = String, example = "100.25")]
    pub amount: Decimal,
}

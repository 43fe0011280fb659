// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement error taxonomy.

use rust_decimal::Decimal;

use crate::storage::{CustodyError, LedgerError, OperationStage};

/// Why a sweep or withdrawal did not produce a receipt.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount too small: {0}")]
    AmountTooSmall(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("No funds to sweep at {0}")]
    NoFundsToSweep(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger credit for operation {operation_id} failed: {reason}")]
    CreditFailed { operation_id: String, reason: String },

    #[error("Compensation of {amount} for operation {operation_id} failed: {reason}")]
    CompensationFailed {
        operation_id: String,
        amount: Decimal,
        reason: String,
    },

    #[error("Operation {operation_id} is still in progress ({stage:?})")]
    OperationInProgress {
        operation_id: String,
        stage: OperationStage,
    },

    #[error("Operation {operation_id} previously failed: {reason}")]
    PreviouslyFailed { operation_id: String, reason: String },

    #[error("Operation {operation_id} needs operator review ({stage:?})")]
    NeedsReview {
        operation_id: String,
        stage: OperationStage,
    },

    #[error("Idempotency key {0} is bound to a different request")]
    IdempotencyConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SettlementError {
    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::AmountTooSmall(_) => "amount_too_small",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::NoFundsToSweep(_) => "no_funds_to_sweep",
            Self::QuoteUnavailable(_) => "quote_unavailable",
            Self::TransferFailed(_) => "transfer_failed",
            Self::Unavailable(_) => "unavailable",
            Self::CreditFailed { .. } => "credit_failed",
            Self::CompensationFailed { .. } => "compensation_failed",
            Self::OperationInProgress { .. } => "operation_in_progress",
            Self::PreviouslyFailed { .. } => "previously_failed",
            Self::NeedsReview { .. } => "needs_review",
            Self::IdempotencyConflict(_) => "idempotency_conflict",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(id) => Self::AccountNotFound(id),
            LedgerError::InvalidAmount(amount) => Self::InvalidAmount(amount.to_string()),
            LedgerError::InsufficientFunds { balance, requested } => {
                Self::InsufficientFunds { balance, requested }
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<CustodyError> for SettlementError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::NotFound(id) => Self::AccountNotFound(id),
            CustodyError::TreasuryMissing => Self::Unavailable("treasury is not configured".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

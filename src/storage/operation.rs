// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable settlement operation records.
//!
//! Every sweep and withdrawal is written to the ledger database before the
//! first external call and checkpointed at each stage. Retries, replays and
//! the background reconciler all work from this record instead of re-running
//! a workflow from scratch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which settlement workflow an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Deposit-Sweep: custodial address -> treasury, then ledger credit.
    Sweep,
    /// Withdrawal: ledger debit, then treasury -> destination.
    Withdrawal,
}

/// Checkpoint reached by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationStage {
    /// Sweep recorded; nothing external has happened yet.
    Started,
    /// Sweep transfer is being submitted. Outcome unknown after a crash.
    SweepSubmitting,
    /// Sweep transfer committed on-chain; the ledger still owes the credit.
    PendingCredit,
    /// Withdrawal amount debited from the ledger.
    Debited,
    /// Payout transfer is being submitted. Outcome unknown after a crash.
    PayoutSubmitting,
    Completed,
    /// Withdrawal failed and its debit was credited back.
    Compensated,
    /// Failed before any side effect.
    Failed,
    /// The compensating credit could not be written.
    CompensationFailed,
    /// Chain outcome unknown; needs an operator.
    ManualReview,
}

/// A sweep or withdrawal in flight (or finished), as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SettlementOperation {
    pub operation_id: String,
    /// Client-supplied key used to detect retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub kind: OperationKind,
    pub account_id: String,
    pub stage: OperationStage,
    /// Chain amount moved (or to be moved), in wei, as a decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_amount_wei: Option<String>,
    /// Ledger amount credited or debited.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub quote_amount: Option<Decimal>,
    /// Exchange rate used for the conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub rate: Option<Decimal>,
    /// Payout destination (withdrawals only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Ledger balance right after the operation completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub resulting_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementOperation {
    fn new(kind: OperationKind, account_id: &str, stage: OperationStage) -> Self {
        let now = Utc::now();
        Self {
            operation_id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: None,
            kind,
            account_id: account_id.to_string(),
            stage,
            chain_amount_wei: None,
            quote_amount: None,
            rate: None,
            destination: None,
            tx_hash: None,
            resulting_balance: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh sweep in the `Started` stage.
    pub fn new_sweep(account_id: &str) -> Self {
        Self::new(OperationKind::Sweep, account_id, OperationStage::Started)
    }

    /// A fresh withdrawal in the `Debited` stage (recorded with the debit).
    pub fn new_withdrawal(account_id: &str, amount: Decimal, destination: &str) -> Self {
        let mut op = Self::new(OperationKind::Withdrawal, account_id, OperationStage::Debited);
        op.quote_amount = Some(amount);
        op.destination = Some(destination.to_string());
        op
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Move to `stage`, bumping `updated_at`.
    pub fn advance(&mut self, stage: OperationStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }

    /// Move to `stage` and record why the operation did not succeed.
    pub fn fail(&mut self, stage: OperationStage, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.advance(stage);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Engine
//!
//! Orchestrates the two money-moving workflows:
//!
//! - **Deposit-Sweep**: custodial address balance minus the fee reserve is
//!   transferred to the treasury, priced through the oracle and credited to
//!   the ledger.
//! - **Withdrawal**: the ledger is debited first, the amount is priced and
//!   paid out from the treasury; any failure after the debit credits it back.
//!
//! Every step is checkpointed in a [`SettlementOperation`] so a retry with
//! the same idempotency key, or the reconciler, picks up where the workflow
//! stopped instead of moving funds twice.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::error::SettlementError;
use crate::blockchain::ChainGateway;
use crate::money::{self, ExchangeRate, QUOTE_SCALE};
use crate::providers::ValueOracle;
use crate::storage::{
    AccountRecord, CustodialAccount, CustodyDirectory, LedgerDb, LedgerError, OperationKind, OperationStage,
    SettlementOperation,
};

/// Stages that can only be resolved by a person.
const REVIEW_STAGES: [OperationStage; 2] =
    [OperationStage::ManualReview, OperationStage::CompensationFailed];

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Currency the ledger is denominated in (e.g. `USD`).
    pub quote_currency: String,
    /// Wei left on a custodial address to pay for the sweep transfer.
    pub fee_reserve_wei: U256,
    /// Age after which an unfinished operation is reconciled.
    pub stale_after: chrono::Duration,
}

/// Outcome of a completed sweep or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SettlementReceipt {
    pub operation_id: String,
    pub account_id: String,
    pub kind: OperationKind,
    /// Ledger balance after this operation.
    #[schema(value_type = String, example = "2997")]
    pub balance: Decimal,
    /// Chain amount moved, in wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_amount_wei: Option<String>,
    /// Ledger amount credited or debited.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub quote_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// True when this is the recorded result of an earlier request.
    pub replayed: bool,
}

impl SettlementReceipt {
    fn from_operation(op: &SettlementOperation, replayed: bool) -> Result<Self, SettlementError> {
        let balance = op.resulting_balance.ok_or_else(|| {
            SettlementError::Storage(format!(
                "operation {} completed without a resulting balance",
                op.operation_id
            ))
        })?;
        Ok(Self {
            operation_id: op.operation_id.clone(),
            account_id: op.account_id.clone(),
            kind: op.kind,
            balance,
            chain_amount_wei: op.chain_amount_wei.clone(),
            quote_amount: op.quote_amount,
            rate: op.rate,
            tx_hash: op.tx_hash.clone(),
            replayed,
        })
    }
}

/// Account as seen by API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountSummary {
    pub account_id: String,
    /// Custodial deposit address.
    pub address: String,
    #[schema(value_type = String, example = "0")]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl AccountSummary {
    fn new(record: AccountRecord, balance: Decimal) -> Self {
        Self {
            account_id: record.account_id,
            address: record.address,
            balance,
            created_at: record.created_at,
        }
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    /// Pending sweep credits applied.
    pub credited: usize,
    /// Withdrawal debits credited back.
    pub compensated: usize,
    /// Abandoned operations marked failed.
    pub failed: usize,
    /// Operations moved to manual review.
    pub escalated: usize,
}

pub struct SettlementEngine {
    ledger: Arc<LedgerDb>,
    custody: Arc<dyn CustodyDirectory>,
    gateway: Arc<dyn ChainGateway>,
    oracle: Arc<dyn ValueOracle>,
    config: SettlementConfig,
    sweep_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<LedgerDb>,
        custody: Arc<dyn CustodyDirectory>,
        gateway: Arc<dyn ChainGateway>,
        oracle: Arc<dyn ValueOracle>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            custody,
            gateway,
            oracle,
            config,
            sweep_locks: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Provision a custodial address and a zero ledger balance.
    pub fn open_account(&self) -> Result<AccountSummary, SettlementError> {
        let record = self.custody.provision()?;
        self.ensure_ledger_account(&record.account_id)?;
        Ok(AccountSummary::new(record, Decimal::ZERO))
    }

    /// Address and ledger balance of an account.
    pub fn account(&self, account_id: &str) -> Result<AccountSummary, SettlementError> {
        let record = self.custody.record(account_id)?;
        let balance = match self.ledger.balance(account_id) {
            Err(LedgerError::AccountNotFound(_)) => Decimal::ZERO,
            other => other?,
        };
        Ok(AccountSummary::new(record, balance))
    }

    /// A recorded settlement operation.
    pub fn operation(&self, operation_id: &str) -> Result<Option<SettlementOperation>, SettlementError> {
        Ok(self.ledger.get_operation(operation_id)?)
    }

    /// Custody may have been written without its ledger row (crash between
    /// the two); create the row on first use.
    fn ensure_ledger_account(&self, account_id: &str) -> Result<(), SettlementError> {
        match self.ledger.create_account(account_id) {
            Ok(()) | Err(LedgerError::AccountExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Deposit-Sweep
    // =========================================================================

    /// Sweep the account's custodial address into the treasury and credit
    /// its value to the ledger. Returns the receipt with the new balance.
    pub async fn sweep_and_credit(
        &self,
        account_id: &str,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt, SettlementError> {
        let account = self.custody.resolve(account_id)?;

        let lock = self.sweep_lock(account_id);
        let result = {
            let _guard = lock.lock().await;
            self.sweep_locked(account, account_id, idempotency_key).await
        };
        drop(lock);
        self.release_sweep_lock(account_id);
        result
    }

    async fn sweep_locked(
        &self,
        account: CustodialAccount,
        account_id: &str,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt, SettlementError> {
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.ledger.find_by_idempotency_key(key)? {
                return self.replay(existing, OperationKind::Sweep, account_id, key).await;
            }
        }

        let treasury = self.custody.treasury()?;
        self.ensure_ledger_account(account_id)?;

        let mut op = SettlementOperation::new_sweep(account_id).with_idempotency_key(idempotency_key);
        if let Err(e) = self.ledger.begin_operation(&op) {
            return self.on_duplicate(e, OperationKind::Sweep, account_id, op.idempotency_key.as_deref()).await;
        }

        let balance = match self.gateway.get_balance(&account.address).await {
            Ok(balance) => balance,
            Err(e) => {
                let err = SettlementError::Unavailable(e.to_string());
                self.record_failure(&mut op, OperationStage::Started, &err);
                return Err(err);
            }
        };

        if balance.is_zero() {
            let err = SettlementError::NoFundsToSweep(account.address.clone());
            self.record_failure(&mut op, OperationStage::Started, &err);
            return Err(err);
        }
        if balance <= self.config.fee_reserve_wei {
            let err = SettlementError::AmountTooSmall(format!(
                "balance {} wei does not exceed the fee reserve of {} wei",
                balance, self.config.fee_reserve_wei
            ));
            self.record_failure(&mut op, OperationStage::Started, &err);
            return Err(err);
        }

        let amount = balance - self.config.fee_reserve_wei;
        op.chain_amount_wei = Some(amount.to_string());
        op.advance(OperationStage::SweepSubmitting);
        self.ledger
            .advance_operation(&op, &[OperationStage::Started])?;

        let receipt = match self
            .gateway
            .transfer(&account.credential, &treasury.address, amount)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = SettlementError::TransferFailed(e.to_string());
                self.record_failure(&mut op, OperationStage::SweepSubmitting, &err);
                return Err(err);
            }
        };
        drop(account);

        info!(
            operation_id = %op.operation_id,
            account_id = %account_id,
            amount = %money::format_wei(amount),
            tx_hash = %receipt.tx_hash,
            "Sweep transfer accepted"
        );

        op.tx_hash = Some(receipt.tx_hash);
        op.advance(OperationStage::PendingCredit);
        if let Err(e) = self
            .ledger
            .advance_operation(&op, &[OperationStage::SweepSubmitting])
        {
            error!(
                operation_id = %op.operation_id,
                account_id = %account_id,
                tx_hash = ?op.tx_hash,
                error = %e,
                "Sweep transferred but the pending credit could not be recorded"
            );
            return Err(SettlementError::CreditFailed {
                operation_id: op.operation_id,
                reason: e.to_string(),
            });
        }

        self.credit_pending(op).await
    }

    /// Price a committed sweep and credit it. The stage guard on
    /// `credit_operation` makes this safe to call from several places.
    async fn credit_pending(
        &self,
        mut op: SettlementOperation,
    ) -> Result<SettlementReceipt, SettlementError> {
        let amount_wei = op
            .chain_amount_wei
            .as_deref()
            .and_then(|raw| U256::from_str(raw).ok())
            .ok_or_else(|| {
                SettlementError::Storage(format!(
                    "operation {} has no chain amount",
                    op.operation_id
                ))
            })?;

        let rate = self.fetch_rate().await.map_err(|e| {
            warn!(
                operation_id = %op.operation_id,
                account_id = %op.account_id,
                error = %e,
                "Sweep credit pending until a quote is available"
            );
            SettlementError::QuoteUnavailable(format!(
                "{e}; credit for operation {} is pending",
                op.operation_id
            ))
        })?;

        let quote = money::chain_to_quote(amount_wei, rate).map_err(|e| {
            SettlementError::CreditFailed {
                operation_id: op.operation_id.clone(),
                reason: e.to_string(),
            }
        })?;

        op.rate = Some(rate.value());
        op.quote_amount = Some(quote);
        op.advance(OperationStage::Completed);

        match self
            .ledger
            .credit_operation(&mut op, quote, &[OperationStage::PendingCredit])
        {
            Ok(balance) => {
                info!(
                    operation_id = %op.operation_id,
                    account_id = %op.account_id,
                    credited = %quote,
                    rate = %rate,
                    balance = %balance,
                    "Sweep credited"
                );
                SettlementReceipt::from_operation(&op, false)
            }
            Err(LedgerError::StageConflict { .. }) => {
                // Another caller credited it first.
                match self.ledger.get_operation(&op.operation_id)? {
                    Some(current) if current.stage == OperationStage::Completed => {
                        SettlementReceipt::from_operation(&current, true)
                    }
                    _ => Err(SettlementError::CreditFailed {
                        operation_id: op.operation_id,
                        reason: "operation left the pending-credit stage".to_string(),
                    }),
                }
            }
            Err(e) => {
                error!(
                    operation_id = %op.operation_id,
                    account_id = %op.account_id,
                    amount = %quote,
                    error = %e,
                    "Ledger credit failed for a committed sweep"
                );
                Err(SettlementError::CreditFailed {
                    operation_id: op.operation_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    // =========================================================================
    // Withdrawal
    // =========================================================================

    /// Debit `amount` from the ledger and pay its chain value to `destination`.
    pub async fn debit_and_pay_out(
        &self,
        account_id: &str,
        destination: &str,
        amount: Decimal,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt, SettlementError> {
        if amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidAmount(format!(
                "{amount} must be greater than zero"
            )));
        }
        let amount = amount.normalize();
        if amount.scale() > QUOTE_SCALE {
            return Err(SettlementError::InvalidAmount(format!(
                "{amount} has more than {QUOTE_SCALE} decimal places"
            )));
        }
        self.gateway
            .validate_address(destination)
            .map_err(|e| SettlementError::InvalidAddress(e.to_string()))?;
        self.custody.record(account_id)?;

        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.ledger.find_by_idempotency_key(key)? {
                return self
                    .replay(existing, OperationKind::Withdrawal, account_id, key)
                    .await;
            }
        }

        let treasury = self.custody.treasury()?;
        self.ensure_ledger_account(account_id)?;

        let mut op = SettlementOperation::new_withdrawal(account_id, amount, destination)
            .with_idempotency_key(idempotency_key);
        let balance_after_debit = match self.ledger.begin_withdrawal(&op, amount) {
            Ok(balance) => balance,
            Err(e) => {
                return self
                    .on_duplicate(e, OperationKind::Withdrawal, account_id, op.idempotency_key.as_deref())
                    .await
            }
        };
        info!(
            operation_id = %op.operation_id,
            account_id = %account_id,
            amount = %amount,
            balance = %balance_after_debit,
            "Withdrawal debited"
        );

        let rate = match self.fetch_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                return Err(self.compensate(
                    &mut op,
                    &[OperationStage::Debited],
                    SettlementError::QuoteUnavailable(e.to_string()),
                ))
            }
        };
        op.rate = Some(rate.value());

        let wei = match money::quote_to_chain(amount, rate) {
            Ok(wei) if !wei.is_zero() => wei,
            Ok(_) => {
                return Err(self.compensate(
                    &mut op,
                    &[OperationStage::Debited],
                    SettlementError::AmountTooSmall(format!(
                        "{amount} {} is worth less than 1 wei at {rate}",
                        self.config.quote_currency
                    )),
                ))
            }
            Err(e) => {
                return Err(self.compensate(
                    &mut op,
                    &[OperationStage::Debited],
                    SettlementError::InvalidAmount(e.to_string()),
                ))
            }
        };

        op.chain_amount_wei = Some(wei.to_string());
        op.advance(OperationStage::PayoutSubmitting);
        match self.ledger.advance_operation(&op, &[OperationStage::Debited]) {
            Ok(()) => {}
            Err(LedgerError::StageConflict { actual, .. }) => {
                // The reconciler already settled this debit; do not pay out.
                return Err(SettlementError::PreviouslyFailed {
                    operation_id: op.operation_id,
                    reason: format!("operation was reconciled to {actual:?} before payout"),
                });
            }
            Err(e) => {
                op.stage = OperationStage::Debited;
                return Err(self.compensate(
                    &mut op,
                    &[OperationStage::Debited],
                    SettlementError::Storage(e.to_string()),
                ));
            }
        }

        let receipt = match self
            .gateway
            .transfer(&treasury.credential, destination, wei)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                return Err(self.compensate(
                    &mut op,
                    &[OperationStage::PayoutSubmitting],
                    SettlementError::TransferFailed(e.to_string()),
                ))
            }
        };
        drop(treasury);

        op.tx_hash = Some(receipt.tx_hash);
        op.resulting_balance = Some(balance_after_debit);
        op.advance(OperationStage::Completed);
        if let Err(e) = self
            .ledger
            .advance_operation(&op, &[OperationStage::PayoutSubmitting])
        {
            // Funds left and the debit stands; only the checkpoint is missing.
            error!(
                operation_id = %op.operation_id,
                account_id = %account_id,
                tx_hash = ?op.tx_hash,
                error = %e,
                "Payout sent but completion could not be recorded"
            );
        }

        info!(
            operation_id = %op.operation_id,
            account_id = %account_id,
            destination = %destination,
            amount_wei = %wei,
            tx_hash = ?op.tx_hash,
            "Withdrawal paid out"
        );
        SettlementReceipt::from_operation(&op, false)
    }

    /// Credit a withdrawal's debit back. Returns the error the caller should
    /// see: `failure` if the credit landed, `CompensationFailed` otherwise.
    fn compensate(
        &self,
        op: &mut SettlementOperation,
        expected: &[OperationStage],
        failure: SettlementError,
    ) -> SettlementError {
        match self.credit_back(op, expected, failure.to_string()) {
            Ok(()) => failure,
            Err(e) => e,
        }
    }

    /// Credit the debited amount and mark the withdrawal `compensated`, or
    /// record `compensation_failed` if the credit cannot be written.
    fn credit_back(
        &self,
        op: &mut SettlementOperation,
        expected: &[OperationStage],
        reason: String,
    ) -> Result<(), SettlementError> {
        let Some(amount) = op.quote_amount else {
            return Err(SettlementError::Storage(format!(
                "withdrawal {} has no debited amount",
                op.operation_id
            )));
        };

        let stored_stage = op.stage;
        op.fail(OperationStage::Compensated, reason.clone());

        match self.ledger.credit_operation(op, amount, expected) {
            Ok(balance) => {
                warn!(
                    operation_id = %op.operation_id,
                    account_id = %op.account_id,
                    amount = %amount,
                    balance = %balance,
                    reason = %reason,
                    "Withdrawal compensated"
                );
                Ok(())
            }
            Err(LedgerError::StageConflict {
                actual: OperationStage::Compensated,
                ..
            }) => Ok(()),
            Err(LedgerError::StageConflict {
                actual: OperationStage::ManualReview,
                ..
            }) => {
                // The reconciler escalated the payout first; the debit stands
                // until an operator settles it.
                op.stage = OperationStage::ManualReview;
                warn!(
                    operation_id = %op.operation_id,
                    account_id = %op.account_id,
                    amount = %amount,
                    reason = %reason,
                    "Withdrawal under manual review; not compensated"
                );
                Err(SettlementError::NeedsReview {
                    operation_id: op.operation_id.clone(),
                    stage: OperationStage::ManualReview,
                })
            }
            Err(e) => {
                op.advance(OperationStage::CompensationFailed);
                if let Err(record_err) = self.ledger.advance_operation(op, &[stored_stage]) {
                    error!(
                        operation_id = %op.operation_id,
                        error = %record_err,
                        "Could not record compensation failure"
                    );
                }
                error!(
                    operation_id = %op.operation_id,
                    account_id = %op.account_id,
                    amount = %amount,
                    reason = %reason,
                    error = %e,
                    "Compensation failed: account is owed its debit"
                );
                Err(SettlementError::CompensationFailed {
                    operation_id: op.operation_id.clone(),
                    amount,
                    reason: e.to_string(),
                })
            }
        }
    }

    // =========================================================================
    // Idempotent replay
    // =========================================================================

    /// Answer a retried request from its recorded operation.
    async fn replay(
        &self,
        op: SettlementOperation,
        kind: OperationKind,
        account_id: &str,
        key: &str,
    ) -> Result<SettlementReceipt, SettlementError> {
        if op.kind != kind || op.account_id != account_id {
            return Err(SettlementError::IdempotencyConflict(key.to_string()));
        }

        match op.stage {
            OperationStage::Completed => SettlementReceipt::from_operation(&op, true),
            OperationStage::Failed | OperationStage::Compensated => {
                Err(SettlementError::PreviouslyFailed {
                    operation_id: op.operation_id,
                    reason: op.failure.unwrap_or_default(),
                })
            }
            OperationStage::PendingCredit => {
                info!(operation_id = %op.operation_id, "Resuming pending sweep credit");
                self.credit_pending(op).await
            }
            stage if REVIEW_STAGES.contains(&stage) => Err(SettlementError::NeedsReview {
                operation_id: op.operation_id,
                stage,
            }),
            stage => Err(SettlementError::OperationInProgress {
                operation_id: op.operation_id,
                stage,
            }),
        }
    }

    /// Map a failed `begin_*` call; a lost idempotency race is answered by
    /// the winning operation.
    async fn on_duplicate(
        &self,
        err: LedgerError,
        kind: OperationKind,
        account_id: &str,
        key: Option<&str>,
    ) -> Result<SettlementReceipt, SettlementError> {
        match (err, key) {
            (LedgerError::DuplicateOperation(_), Some(key)) => {
                match self.ledger.find_by_idempotency_key(key)? {
                    Some(existing) => self.replay(existing, kind, account_id, key).await,
                    None => Err(SettlementError::Storage(format!(
                        "idempotency key {key} vanished"
                    ))),
                }
            }
            (e, _) => Err(e.into()),
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// One pass over unfinished operations. See [`super::reconciler`].
    pub async fn reconcile(&self) -> Result<ReconcileReport, SettlementError> {
        let mut report = ReconcileReport::default();

        for op in self.ledger.list_operations(&[OperationStage::PendingCredit])? {
            let operation_id = op.operation_id.clone();
            match self.credit_pending(op).await {
                Ok(receipt) if !receipt.replayed => report.credited += 1,
                Ok(_) => {}
                Err(e) => warn!(operation_id = %operation_id, error = %e, "Pending credit still open"),
            }
        }

        for mut op in self.ledger.list_operations(&[OperationStage::CompensationFailed])? {
            let reason = op.failure.clone().unwrap_or_default();
            if self
                .credit_back(&mut op, &[OperationStage::CompensationFailed], reason)
                .is_ok()
            {
                report.compensated += 1;
            }
        }

        let cutoff = Utc::now() - self.config.stale_after;
        let stale = self.ledger.list_operations(&[
            OperationStage::Started,
            OperationStage::Debited,
            OperationStage::SweepSubmitting,
            OperationStage::PayoutSubmitting,
        ])?;

        for mut op in stale.into_iter().filter(|op| op.updated_at < cutoff) {
            match op.stage {
                OperationStage::Debited => {
                    let reason = "abandoned before payout".to_string();
                    if self
                        .credit_back(&mut op, &[OperationStage::Debited], reason)
                        .is_ok()
                    {
                        report.compensated += 1;
                    }
                }
                OperationStage::Started => {
                    op.fail(OperationStage::Failed, "abandoned before transfer");
                    if self
                        .ledger
                        .advance_operation(&op, &[OperationStage::Started])
                        .is_ok()
                    {
                        report.failed += 1;
                    }
                }
                stage => {
                    op.fail(
                        OperationStage::ManualReview,
                        format!("transfer outcome unknown after {stage:?}"),
                    );
                    if self.ledger.advance_operation(&op, &[stage]).is_ok() {
                        error!(
                            operation_id = %op.operation_id,
                            account_id = %op.account_id,
                            kind = ?op.kind,
                            stage = ?stage,
                            chain_amount_wei = ?op.chain_amount_wei,
                            "Operation needs manual review: transfer outcome unknown"
                        );
                        report.escalated += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn fetch_rate(&self) -> Result<ExchangeRate, crate::providers::OracleError> {
        self.oracle.get_rate(&self.config.quote_currency).await
    }

    fn sweep_lock(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .sweep_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget an account's sweep lock once nobody holds or waits on it.
    fn release_sweep_lock(&self, account_id: &str) {
        let mut locks = self
            .sweep_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(account_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(account_id);
        }
    }

    /// Persist a pre-transfer failure. Losing this write only leaves a stale
    /// operation for the reconciler.
    fn record_failure(
        &self,
        op: &mut SettlementOperation,
        expected: OperationStage,
        err: &SettlementError,
    ) {
        op.fail(OperationStage::Failed, err.to_string());
        if let Err(e) = self.ledger.advance_operation(op, &[expected]) {
            warn!(operation_id = %op.operation_id, error = %e, "Could not record failure");
        }
        info!(
            operation_id = %op.operation_id,
            account_id = %op.account_id,
            kind = ?op.kind,
            code = err.code(),
            "Settlement failed"
        );
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Reconciler
//!
//! Background task that finishes or parks settlement operations a request
//! did not finish (crash, restart, oracle outage).
//!
//! ## Strategy
//!
//! Every `interval` (default 30 s) the reconciler:
//! 1. Credits sweeps stuck in `pending_credit`.
//! 2. Retries compensations stuck in `compensation_failed`.
//! 3. Compensates withdrawals left in `debited` longer than the stale
//!    threshold (no payout was ever submitted).
//! 4. Fails sweeps left in `started` (nothing happened on-chain).
//! 5. Moves `*_submitting` operations to `manual_review`: the chain may or
//!    may not have the transfer, so nobody retries it automatically.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::engine::{ReconcileReport, SettlementEngine};

/// Default interval between reconciliation passes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic driver for [`SettlementEngine::reconcile`].
pub struct Reconciler {
    engine: Arc<SettlementEngine>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self {
            engine,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the reconciliation loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(reconciler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Settlement reconciler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Settlement reconciler shutting down");
                return;
            }

            self.step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Settlement reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one pass and log what changed.
    pub async fn step(&self) -> Option<ReconcileReport> {
        match self.engine.reconcile().await {
            Ok(report) => {
                if report != ReconcileReport::default() {
                    info!(
                        credited = report.credited,
                        compensated = report.compensated,
                        failed = report.failed,
                        escalated = report.escalated,
                        "Reconciliation pass applied changes"
                    );
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation pass failed");
                None
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement workflows: deposit sweeps, withdrawals and their reconciliation.

pub mod engine;
pub mod error;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{
    AccountSummary, ReconcileReport, SettlementConfig, SettlementEngine, SettlementReceipt,
};
pub use error::SettlementError;
pub use reconciler::Reconciler;

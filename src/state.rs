// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::settlement::SettlementEngine;
use crate::storage::{FileCustodyDirectory, LedgerDb};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    /// Held for readiness probes; settlement goes through `engine`.
    pub ledger: Arc<LedgerDb>,
    pub custody: Arc<FileCustodyDirectory>,
}

impl AppState {
    pub fn new(
        engine: Arc<SettlementEngine>,
        ledger: Arc<LedgerDb>,
        custody: Arc<FileCustodyDirectory>,
    ) -> Self {
        Self {
            engine,
            ledger,
            custody,
        }
    }
}

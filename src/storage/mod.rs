// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives under a single data directory:
//!
//! ```text
//! {data}/
//!   ledger.redb                  # Balances, settlement operations, idempotency keys
//!   accounts/{account_id}/
//!     meta.json                  # Account metadata (address, created_at)
//!     key.pem                    # Custodial private key (NEVER exposed via API)
//!   treasury/
//!     meta.json
//!     key.pem
//! ```
//!
//! ## Important Notes
//!
//! - Custody files use **normal filesystem I/O**; at-rest encryption is the
//!   job of the volume mounted at the data directory
//! - Every balance change goes through a single redb write transaction

pub mod custody;
pub mod files;
pub mod ledger;
pub mod operation;
pub mod paths;

pub use custody::{
    AccountRecord, CustodialAccount, CustodyDirectory, CustodyError, FileCustodyDirectory,
};
pub use files::{FileStorage, StorageError, StorageResult};
pub use ledger::{LedgerDb, LedgerError, LedgerResult};
pub use operation::{OperationKind, OperationStage, SettlementOperation};
pub use paths::StoragePaths;

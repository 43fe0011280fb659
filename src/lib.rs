// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial Cashier - Custodial EVM Settlement Service
//!
//! Issues each account a custodial deposit address, sweeps deposits into the
//! operator treasury and keeps a fiat-denominated ledger that can be paid out
//! on-chain.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `blockchain` - EVM chain access and transaction signing
//! - `providers` - Exchange-rate oracle (CoinMarketCap)
//! - `settlement` - Sweep and withdrawal workflows, background reconciler
//! - `storage` - Key custody on disk and the redb ledger

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod money;
pub mod providers;
pub mod settlement;
pub mod state;
pub mod storage;

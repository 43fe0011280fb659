// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External price providers.

pub mod coinmarketcap;

use async_trait::async_trait;

use crate::money::ExchangeRate;

pub use coinmarketcap::CoinMarketCapClient;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Price request failed: {0}")]
    Request(String),

    #[error("Price response was invalid: {0}")]
    InvalidResponse(String),

    #[error("No price for {symbol} in {currency}")]
    MissingQuote { symbol: String, currency: String },
}

/// Source of the current chain-asset price in a quote currency.
#[async_trait]
pub trait ValueOracle: Send + Sync {
    /// Quote-currency units per whole chain-native unit.
    async fn get_rate(&self, quote_currency: &str) -> Result<ExchangeRate, OracleError>;
}

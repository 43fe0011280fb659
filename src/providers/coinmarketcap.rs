// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CoinMarketCap price oracle.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::{OracleError, ValueOracle};
use crate::money::ExchangeRate;

pub const DEFAULT_API_BASE_URL: &str = "https://pro-api.coinmarketcap.com";
const QUOTES_PATH: &str = "/v1/cryptocurrency/quotes/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

#[derive(Debug, Clone)]
pub struct CoinMarketCapClient {
    api_base_url: String,
    api_key: String,
    symbol: String,
    http: Client,
}

impl CoinMarketCapClient {
    /// Client quoting `symbol` (e.g. `ETH`), with a 15 s request timeout.
    pub fn new(api_base_url: &str, api_key: &str, symbol: &str) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OracleError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            symbol: symbol.to_ascii_uppercase(),
            http,
        })
    }

    async fn get_json(&self, currency: &str) -> Result<Value, OracleError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base_url, QUOTES_PATH))
            .query(&[("symbol", self.symbol.as_str()), ("convert", currency)])
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| OracleError::Request(format!("GET {QUOTES_PATH} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Request(format!(
                "GET {QUOTES_PATH} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl ValueOracle for CoinMarketCapClient {
    async fn get_rate(&self, quote_currency: &str) -> Result<ExchangeRate, OracleError> {
        let currency = quote_currency.to_ascii_uppercase();
        let body = self.get_json(&currency).await?;
        let price = parse_price(&body, &self.symbol, &currency)?;
        debug!(symbol = %self.symbol, currency = %currency, %price, "Fetched price");
        ExchangeRate::new(price).map_err(|e| OracleError::InvalidResponse(e.to_string()))
    }
}

/// Read `data.<SYMBOL>.quote.<CCY>.price` as an exact decimal.
///
/// `data.<SYMBOL>` may be an object or (in newer API versions) an array of
/// candidates; the first candidate wins.
pub fn parse_price(body: &Value, symbol: &str, currency: &str) -> Result<Decimal, OracleError> {
    let missing = || OracleError::MissingQuote {
        symbol: symbol.to_string(),
        currency: currency.to_string(),
    };

    let entry = body.get("data").and_then(|d| d.get(symbol)).ok_or_else(missing)?;
    let entry = match entry {
        Value::Array(items) => items.first().ok_or_else(missing)?,
        other => other,
    };

    let price = entry
        .get("quote")
        .and_then(|q| q.get(currency))
        .and_then(|q| q.get("price"))
        .ok_or_else(missing)?;

    let raw = match price {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => return Err(missing()),
        other => {
            return Err(OracleError::InvalidResponse(format!(
                "price is not a number: {other}"
            )))
        }
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| OracleError::InvalidResponse(format!("unparseable price {raw}: {e}")))
}

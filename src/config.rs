// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger and custody files | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RPC_URL` | EVM JSON-RPC endpoint | Ethereum Sepolia public RPC |
//! | `NETWORK_NAME` | Display name of the network | `Ethereum Sepolia` |
//! | `EXPLORER_URL` | Block explorer base URL | `https://sepolia.etherscan.io` |
//! | `CMC_API_KEY` | CoinMarketCap API key | Required |
//! | `CMC_API_URL` | CoinMarketCap API base URL | `https://pro-api.coinmarketcap.com` |
//! | `ASSET_SYMBOL` | Chain asset symbol priced by the oracle | `ETH` |
//! | `QUOTE_CURRENCY` | Ledger currency | `USD` |
//! | `SWEEP_FEE_RESERVE_WEI` | Wei left behind on a sweep to pay its fee | `1000000000000000` |
//! | `TRANSFER_GAS_LIMIT` | Gas limit of value transfers | `21000` |
//! | `RECONCILE_INTERVAL_SECS` | Seconds between reconciliation passes | `30` |
//! | `STALE_OPERATION_SECS` | Age before an unfinished operation is reconciled | `600` |
//! | `TREASURY_PRIVATE_KEY` | Hex key to install as treasury (else generated) | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use alloy::primitives::U256;

use crate::blockchain::{NetworkConfig, DEFAULT_TRANSFER_GAS_LIMIT};
use crate::providers::coinmarketcap::DEFAULT_API_BASE_URL;
use crate::storage::paths::DATA_ROOT;

/// Root directory for the ledger database and custody files.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const NETWORK_NAME_ENV: &str = "NETWORK_NAME";
pub const EXPLORER_URL_ENV: &str = "EXPLORER_URL";
/// Sent as `X-CMC_PRO_API_KEY`. Never logged.
pub const CMC_API_KEY_ENV: &str = "CMC_API_KEY";
pub const CMC_API_URL_ENV: &str = "CMC_API_URL";
pub const ASSET_SYMBOL_ENV: &str = "ASSET_SYMBOL";
pub const QUOTE_CURRENCY_ENV: &str = "QUOTE_CURRENCY";
pub const SWEEP_FEE_RESERVE_WEI_ENV: &str = "SWEEP_FEE_RESERVE_WEI";
pub const TRANSFER_GAS_LIMIT_ENV: &str = "TRANSFER_GAS_LIMIT";
pub const RECONCILE_INTERVAL_SECS_ENV: &str = "RECONCILE_INTERVAL_SECS";
pub const STALE_OPERATION_SECS_ENV: &str = "STALE_OPERATION_SECS";
/// Imported once into `{DATA_DIR}/treasury`; a different key is refused later.
pub const TREASURY_PRIVATE_KEY_ENV: &str = "TREASURY_PRIVATE_KEY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ASSET_SYMBOL: &str = "ETH";
pub const DEFAULT_QUOTE_CURRENCY: &str = "USD";
/// 0.001 ETH.
pub const DEFAULT_SWEEP_FEE_RESERVE_WEI: u64 = 1_000_000_000_000_000;
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_STALE_OPERATION_SECS: u64 = 600;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the server needs at startup.
///
/// Not `Debug`: it carries the API key and possibly the treasury key.
#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: String,
    pub bind_addr: SocketAddr,
    pub network: NetworkConfig,
    pub transfer_gas_limit: u64,
    pub cmc_api_key: String,
    pub cmc_api_url: String,
    pub asset_symbol: String,
    pub quote_currency: String,
    pub sweep_fee_reserve_wei: U256,
    pub reconcile_interval: Duration,
    pub stale_after: Duration,
    pub treasury_private_key: Option<String>,
    pub json_logs: bool,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup` (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    name: HOST_ENV,
                    reason: e.to_string(),
                })?;

        let defaults = NetworkConfig::sepolia();
        let network = NetworkConfig {
            name: get(NETWORK_NAME_ENV).unwrap_or(defaults.name),
            rpc_url: get(RPC_URL_ENV).unwrap_or(defaults.rpc_url),
            explorer_url: get(EXPLORER_URL_ENV).unwrap_or(defaults.explorer_url),
        };
        url::Url::parse(&network.rpc_url).map_err(|e| ConfigError::Invalid {
            name: RPC_URL_ENV,
            reason: e.to_string(),
        })?;

        let sweep_fee_reserve_wei = match get(SWEEP_FEE_RESERVE_WEI_ENV) {
            Some(raw) => U256::from_str(&raw).map_err(|e| ConfigError::Invalid {
                name: SWEEP_FEE_RESERVE_WEI_ENV,
                reason: e.to_string(),
            })?,
            None => U256::from(DEFAULT_SWEEP_FEE_RESERVE_WEI),
        };

        let transfer_gas_limit = parse_or(
            get(TRANSFER_GAS_LIMIT_ENV),
            TRANSFER_GAS_LIMIT_ENV,
            DEFAULT_TRANSFER_GAS_LIMIT,
        )?;
        if transfer_gas_limit == 0 {
            return Err(ConfigError::Invalid {
                name: TRANSFER_GAS_LIMIT_ENV,
                reason: "must be positive".to_string(),
            });
        }

        let reconcile_secs = parse_or(
            get(RECONCILE_INTERVAL_SECS_ENV),
            RECONCILE_INTERVAL_SECS_ENV,
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )?;
        let stale_secs = parse_or(
            get(STALE_OPERATION_SECS_ENV),
            STALE_OPERATION_SECS_ENV,
            DEFAULT_STALE_OPERATION_SECS,
        )?;

        Ok(Self {
            data_dir: get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()),
            bind_addr,
            network,
            transfer_gas_limit,
            cmc_api_key: get(CMC_API_KEY_ENV).ok_or(ConfigError::Missing(CMC_API_KEY_ENV))?,
            cmc_api_url: get(CMC_API_URL_ENV).unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            asset_symbol: get(ASSET_SYMBOL_ENV)
                .unwrap_or_else(|| DEFAULT_ASSET_SYMBOL.to_string())
                .to_ascii_uppercase(),
            quote_currency: get(QUOTE_CURRENCY_ENV)
                .unwrap_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string())
                .to_ascii_uppercase(),
            sweep_fee_reserve_wei,
            reconcile_interval: Duration::from_secs(reconcile_secs.max(1)),
            stale_after: Duration::from_secs(stale_secs),
            treasury_private_key: get(TREASURY_PRIVATE_KEY_ENV),
            json_logs: get(LOG_FORMAT_ENV).is_some_and(|v| v.eq_ignore_ascii_case("json")),
        })
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

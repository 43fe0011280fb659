// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Gas limit of a plain value transfer.
pub const DEFAULT_TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Default priority fee (tip) in wei: 1.5 gwei.
pub const DEFAULT_PRIORITY_FEE_WEI: u128 = 1_500_000_000;

/// EVM network the gateway talks to.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: String,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Block explorer URL
    pub explorer_url: String,
}

impl NetworkConfig {
    /// Ethereum Sepolia testnet through a public RPC.
    pub fn sepolia() -> Self {
        Self {
            name: "Ethereum Sepolia".to_string(),
            rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            explorer_url: "https://sepolia.etherscan.io".to_string(),
        }
    }

    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Result of a transfer accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Explorer URL for the transaction
    pub explorer_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_url_joins_cleanly() {
        let mut network = NetworkConfig::sepolia();
        network.explorer_url = "https://explorer.example/".to_string();
        assert_eq!(network.tx_url("0xabc"), "https://explorer.example/tx/0xabc");
    }
}

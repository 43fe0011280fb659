// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain gateway backed by an alloy HTTP provider.

use alloy::{
    network::Ethereum,
    primitives::U256,
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;

use super::gateway::{parse_address, ChainGateway, GatewayError};
use super::signing::SigningCredential;
use super::types::{NetworkConfig, TransferReceipt, DEFAULT_PRIORITY_FEE_WEI};

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Gateway for native-value transfers on an EVM chain.
pub struct EvmGateway {
    network: NetworkConfig,
    rpc_url: url::Url,
    provider: HttpProvider,
    gas_limit: u64,
}

impl EvmGateway {
    /// Create a gateway for `network`, sending transfers with `gas_limit`.
    pub fn new(network: NetworkConfig, gas_limit: u64) -> Result<Self, GatewayError> {
        let rpc_url: url::Url = network.rpc_url.parse().map_err(|e: url::ParseError| {
            GatewayError::Unavailable(format!("invalid RPC URL: {e}"))
        })?;

        let provider = ProviderBuilder::new().connect_http(rpc_url.clone());

        Ok(Self {
            network,
            rpc_url,
            provider,
            gas_limit,
        })
    }

    /// Current block number; used as a connectivity probe.
    pub async fn get_block_number(&self) -> Result<u64, GatewayError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }

    /// Fee rate from the node's suggested gas price: `(max_fee, priority_fee)`.
    async fn fee_rate(&self) -> Result<(u128, u128), GatewayError> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("failed to get gas price: {e}")))?;
        Ok((gas_price, DEFAULT_PRIORITY_FEE_WEI.min(gas_price)))
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn get_balance(&self, address: &str) -> Result<U256, GatewayError> {
        let addr = parse_address(address)?;
        self.provider
            .get_balance(addr)
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }

    async fn transfer(
        &self,
        credential: &SigningCredential,
        to: &str,
        amount: U256,
    ) -> Result<TransferReceipt, GatewayError> {
        let to_addr = parse_address(to)?;
        let from = credential.address()?;

        let (max_fee_per_gas, priority_fee) = self.fee_rate().await?;
        let fee_budget = U256::from(self.gas_limit) * U256::from(max_fee_per_gas);
        let required = amount.saturating_add(fee_budget);

        let available = self
            .provider
            .get_balance(from)
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        if available < required {
            return Err(GatewayError::InsufficientOnChainFunds {
                available,
                required,
            });
        }

        let tx = TransactionRequest::default()
            .from(from)
            .to(to_addr)
            .value(amount)
            .gas_limit(self.gas_limit)
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(priority_fee);

        let signing_provider = ProviderBuilder::new()
            .wallet(credential.wallet()?)
            .connect_http(self.rpc_url.clone());

        let pending = signing_provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_send_error(e.to_string(), available, required))?;

        let tx_hash = format!("{:?}", pending.tx_hash());
        tracing::info!(
            from = %from,
            to = %to_addr,
            amount_wei = %amount,
            tx_hash = %tx_hash,
            network = %self.network.name,
            "Transfer accepted by node"
        );

        Ok(TransferReceipt {
            explorer_url: self.network.tx_url(&tx_hash),
            tx_hash,
        })
    }
}

/// Map a send failure onto the gateway taxonomy.
fn classify_send_error(message: String, available: U256, required: U256) -> GatewayError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient funds") {
        GatewayError::InsufficientOnChainFunds {
            available,
            required,
        }
    } else if lower.contains("server returned an error response") {
        GatewayError::Rejected(message)
    } else {
        GatewayError::Unavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_errors_are_classified() {
        let one = U256::from(1u64);
        assert!(matches!(
            classify_send_error(
                "server returned an error response: error code -32000: insufficient funds for gas * price + value".into(),
                one,
                one
            ),
            GatewayError::InsufficientOnChainFunds { .. }
        ));
        assert!(matches!(
            classify_send_error(
                "server returned an error response: error code -32000: nonce too low".into(),
                one,
                one
            ),
            GatewayError::Rejected(_)
        ));
        assert!(matches!(
            classify_send_error("error sending request for url".into(), one, one),
            GatewayError::Unavailable(_)
        ));
    }

    #[test]
    fn invalid_rpc_url_is_rejected() {
        let mut network = NetworkConfig::sepolia();
        network.rpc_url = "not a url".to_string();
        assert!(matches!(
            EvmGateway::new(network, 21_000),
            Err(GatewayError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn gateway_builds_for_valid_network() {
        let gateway = EvmGateway::new(NetworkConfig::sepolia(), 21_000).unwrap();
        assert!(gateway
            .validate_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")
            .is_ok());
    }
}

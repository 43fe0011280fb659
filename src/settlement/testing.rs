// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process chain and price doubles for engine and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use super::engine::{SettlementConfig, SettlementEngine};
use crate::blockchain::{ChainGateway, GatewayError, SigningCredential, TransferReceipt};
use crate::money::ExchangeRate;
use crate::providers::{OracleError, ValueOracle};
use crate::storage::{
    AccountRecord, CustodyDirectory, FileCustodyDirectory, LedgerDb, StoragePaths,
};

/// Rate used unless a test overrides it.
pub const RATE: Decimal = dec!(3000);

/// 0.001 ETH.
pub const FEE_RESERVE_WEI: u64 = 1_000_000_000_000_000;

/// A transfer the mock gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub from: String,
    pub to: String,
    pub amount: U256,
}

/// Chain double: balances in memory, transfers move them and are recorded.
#[derive(Default)]
pub struct MockGateway {
    balances: Mutex<HashMap<String, U256>>,
    transfers: Mutex<Vec<RecordedTransfer>>,
    fail_transfers: AtomicBool,
    fail_balance_reads: AtomicBool,
    transfer_delay: Mutex<Option<Duration>>,
}

impl MockGateway {
    pub fn set_balance(&self, address: &str, amount: U256) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), amount);
    }

    pub fn balance_of(&self, address: &str) -> U256 {
        self.balances
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.fail_balance_reads.store(fail, Ordering::SeqCst);
    }

    /// Move funds at once but answer `transfer` only after `delay`.
    pub fn delay_transfers(&self, delay: Duration) {
        *self.transfer_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn get_balance(&self, address: &str) -> Result<U256, GatewayError> {
        if self.fail_balance_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("rpc down".into()));
        }
        self.validate_address(address)?;
        Ok(self.balance_of(address))
    }

    async fn transfer(
        &self,
        credential: &SigningCredential,
        to: &str,
        amount: U256,
    ) -> Result<TransferReceipt, GatewayError> {
        self.validate_address(to)?;
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("nonce too low".into()));
        }
        let from = format!("{:?}", credential.address()?).to_lowercase();
        let to = to.to_lowercase();

        {
            let mut balances = self.balances.lock().unwrap();
            let available = balances.get(&from).copied().unwrap_or_default();
            if available < amount {
                return Err(GatewayError::InsufficientOnChainFunds {
                    available,
                    required: amount,
                });
            }
            balances.insert(from.clone(), available - amount);
            *balances.entry(to.clone()).or_default() += amount;
        }

        let tx_hash = {
            let mut transfers = self.transfers.lock().unwrap();
            transfers.push(RecordedTransfer { from, to, amount });
            format!("0x{:064x}", transfers.len())
        };

        let delay = *self.transfer_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TransferReceipt {
            explorer_url: format!("https://explorer.test/tx/{tx_hash}"),
            tx_hash,
        })
    }
}

/// Price double. `None` makes every request fail.
pub struct MockOracle {
    rate: Mutex<Option<Decimal>>,
    calls: AtomicUsize,
}

impl MockOracle {
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate: Mutex::new(Some(rate)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_rate(&self, rate: Option<Decimal>) {
        *self.rate.lock().unwrap() = rate;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValueOracle for MockOracle {
    async fn get_rate(&self, quote_currency: &str) -> Result<ExchangeRate, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rate = *self.rate.lock().unwrap();
        match rate {
            Some(rate) => ExchangeRate::new(rate)
                .map_err(|e| OracleError::InvalidResponse(e.to_string())),
            None => Err(OracleError::MissingQuote {
                symbol: "ETH".into(),
                currency: quote_currency.into(),
            }),
        }
    }
}

/// Engine wired to a temp data directory and the doubles above.
pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub ledger: Arc<LedgerDb>,
    pub custody: Arc<FileCustodyDirectory>,
    pub gateway: Arc<MockGateway>,
    pub oracle: Arc<MockOracle>,
    _temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stale_after(chrono::Duration::minutes(10))
    }

    pub fn with_stale_after(stale_after: chrono::Duration) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let ledger = Arc::new(LedgerDb::open(&paths.ledger_db()).unwrap());
        let custody = Arc::new(FileCustodyDirectory::open(paths).unwrap());
        let treasury = custody.bootstrap_treasury().unwrap();

        let gateway = Arc::new(MockGateway::default());
        // 10 ETH of payout liquidity.
        gateway.set_balance(
            &treasury.address,
            U256::from(10u64) * U256::from(1_000_000_000_000_000_000u64),
        );
        let oracle = Arc::new(MockOracle::new(RATE));

        let engine = Arc::new(SettlementEngine::new(
            ledger.clone(),
            custody.clone(),
            gateway.clone(),
            oracle.clone(),
            SettlementConfig {
                quote_currency: "USD".to_string(),
                fee_reserve_wei: U256::from(FEE_RESERVE_WEI),
                stale_after,
            },
        ));

        Self {
            engine,
            ledger,
            custody,
            gateway,
            oracle,
            _temp: temp,
        }
    }

    pub fn treasury_address(&self) -> String {
        self.custody.treasury_record().unwrap().address
    }

    /// Provisioned account whose custodial address holds `wei` on-chain.
    pub fn funded_account(&self, wei: U256) -> AccountRecord {
        let record = self.custody.provision().unwrap();
        self.ledger.create_account(&record.account_id).unwrap();
        self.gateway.set_balance(&record.address, wei);
        record
    }

    /// Provisioned account with `amount` already on the ledger.
    pub fn credited_account(&self, amount: Decimal) -> AccountRecord {
        let record = self.funded_account(U256::ZERO);
        self.ledger.credit(&record.account_id, amount).unwrap();
        record
    }
}

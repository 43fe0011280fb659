// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::sync::Arc;

use custodial_cashier::{
    api::router,
    blockchain::{EvmGateway, SigningCredential},
    config::{AppConfig, DEFAULT_LOG_FILTER},
    providers::CoinMarketCapClient,
    settlement::{Reconciler, SettlementConfig, SettlementEngine},
    state::AppState,
    storage::{FileCustodyDirectory, LedgerDb, StoragePaths},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.json_logs);

    if let Err(e) = run(config).await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn Error>> {
    let paths = StoragePaths::new(&config.data_dir);
    let custody = Arc::new(FileCustodyDirectory::open(paths.clone())?);
    let ledger = Arc::new(LedgerDb::open(&paths.ledger_db())?);

    let treasury = match config.treasury_private_key.as_deref() {
        Some(key) => custody.import_treasury(SigningCredential::from_hex(key)?)?,
        None if custody.has_treasury() => custody.treasury_record()?,
        None => {
            let record = custody.bootstrap_treasury()?;
            info!(address = %record.address, "Generated treasury key; fund this address for payouts");
            record
        }
    };
    info!(
        address = %treasury.address,
        network = %config.network.name,
        "Treasury loaded"
    );

    let gateway = Arc::new(EvmGateway::new(
        config.network.clone(),
        config.transfer_gas_limit,
    )?);
    match gateway.get_block_number().await {
        Ok(block) => info!(block, rpc_url = %config.network.rpc_url, "Connected to chain"),
        Err(e) => error!(error = %e, "Chain RPC unreachable at startup; continuing"),
    }

    let oracle = Arc::new(CoinMarketCapClient::new(
        &config.cmc_api_url,
        &config.cmc_api_key,
        &config.asset_symbol,
    )?);

    let engine = Arc::new(SettlementEngine::new(
        ledger.clone(),
        custody.clone(),
        gateway,
        oracle,
        SettlementConfig {
            quote_currency: config.quote_currency.clone(),
            fee_reserve_wei: config.sweep_fee_reserve_wei,
            stale_after: chrono::Duration::from_std(config.stale_after)?,
        },
    ));

    let shutdown = CancellationToken::new();
    let reconciler = tokio::spawn(
        Reconciler::new(engine.clone())
            .with_interval(config.reconcile_interval)
            .run(shutdown.clone()),
    );

    let app = router(AppState::new(engine, ledger, custody));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Custodial cashier listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = reconciler.await {
        error!(error = %e, "Reconciler task ended abnormally");
    }
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial account endpoints.
//!
//! Opening an account generates a fresh signing key for the account's
//! deposit address. The key never leaves the data directory.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{error::ApiError, settlement::AccountSummary, state::AppState};

/// Open a custodial account with its own deposit address.
#[utoipa::path(
    post,
    path = "/v1/accounts",
    tag = "Accounts",
    responses(
        (status = 201, description = "Account opened", body = AccountSummary),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody)
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AccountSummary>), ApiError> {
    let summary = state.engine.open_account()?;

    tracing::info!(
        account_id = %summary.account_id,
        address = %summary.address,
        "Custodial account opened"
    );

    Ok((StatusCode::CREATED, Json(summary)))
}

/// Deposit address and ledger balance of an account.
#[utoipa::path(
    get,
    path = "/v1/accounts/{account_id}",
    tag = "Accounts",
    params(
        ("account_id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Account details", body = AccountSummary),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountSummary>, ApiError> {
    Ok(Json(state.engine.account(&account_id)?))
}

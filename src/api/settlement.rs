// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement endpoints: deposit sweeps, withdrawals and operation lookup.
//!
//! Both money-moving endpoints accept an optional `Idempotency-Key` header.
//! Repeating a request with the same key returns the first outcome instead
//! of moving funds again.
//!
//! The workflows run on their own task: a client that disconnects drops the
//! response, never a half-finished settlement.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{
    error::{ApiError, ErrorBody},
    models::{WithdrawRequest, IDEMPOTENCY_KEY_HEADER, MAX_IDEMPOTENCY_KEY_LEN},
    settlement::SettlementReceipt,
    state::AppState,
    storage::SettlementOperation,
};

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| ApiError::bad_request("Idempotency-Key must be ASCII"))?
        .trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::bad_request(format!(
            "Idempotency-Key must be 1-{MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(Some(key.to_string()))
}

/// Sweep the account's deposit address into the treasury and credit the
/// quoted value to its ledger balance.
#[utoipa::path(
    post,
    path = "/v1/accounts/{account_id}/sweep",
    tag = "Settlement",
    params(
        ("account_id" = String, Path, description = "Account ID"),
        ("Idempotency-Key" = Option<String>, Header, description = "Client idempotency key")
    ),
    responses(
        (status = 200, description = "Deposit swept and credited", body = SettlementReceipt),
        (status = 404, description = "Account not found", body = ErrorBody),
        (status = 409, description = "Operation in progress or under review", body = ErrorBody),
        (status = 422, description = "Nothing to sweep", body = ErrorBody),
        (status = 502, description = "On-chain transfer failed", body = ErrorBody),
        (status = 503, description = "Price or chain unavailable", body = ErrorBody)
    )
)]
pub async fn sweep(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let key = idempotency_key(&headers)?;
    let engine = state.engine.clone();
    let receipt = tokio::spawn(async move { engine.sweep_and_credit(&account_id, key).await })
        .await
        .map_err(|e| ApiError::internal(format!("Sweep task failed: {e}")))??;
    Ok(Json(receipt))
}

/// Debit the ledger and pay the equivalent chain amount to `destination`.
#[utoipa::path(
    post,
    path = "/v1/accounts/{account_id}/withdrawals",
    tag = "Settlement",
    params(
        ("account_id" = String, Path, description = "Account ID"),
        ("Idempotency-Key" = Option<String>, Header, description = "Client idempotency key")
    ),
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal paid out", body = SettlementReceipt),
        (status = 400, description = "Invalid amount or address", body = ErrorBody),
        (status = 404, description = "Account not found", body = ErrorBody),
        (status = 409, description = "Operation in progress or under review", body = ErrorBody),
        (status = 422, description = "Insufficient ledger balance", body = ErrorBody),
        (status = 502, description = "On-chain payout failed", body = ErrorBody),
        (status = 503, description = "Price or chain unavailable", body = ErrorBody)
    )
)]
pub async fn withdraw(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<WithdrawRequest>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    let key = idempotency_key(&headers)?;
    let engine = state.engine.clone();
    let receipt = tokio::spawn(async move {
        engine
            .debit_and_pay_out(&account_id, &request.destination, request.amount, key)
            .await
    })
    .await
    .map_err(|e| ApiError::internal(format!("Withdrawal task failed: {e}")))??;
    Ok(Json(receipt))
}

/// Current record of a settlement operation.
#[utoipa::path(
    get,
    path = "/v1/operations/{operation_id}",
    tag = "Settlement",
    params(
        ("operation_id" = String, Path, description = "Operation ID")
    ),
    responses(
        (status = 200, description = "Operation record", body = SettlementOperation),
        (status = 404, description = "Operation not found", body = ErrorBody)
    )
)]
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<SettlementOperation>, ApiError> {
    state
        .engine
        .operation(&operation_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Operation not found: {operation_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn idempotency_key_is_optional() {
        assert_eq!(idempotency_key(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn idempotency_key_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" order-7 "));
        assert_eq!(
            idempotency_key(&headers).unwrap().as_deref(),
            Some("order-7")
        );
    }

    #[test]
    fn oversized_idempotency_key_is_rejected() {
        let mut headers = HeaderMap::new();
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(&long).unwrap());
        let err = idempotency_key(&headers).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::settlement::SettlementError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// JSON error body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error kind (e.g. `insufficient_funds`).
    code: String,
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        use SettlementError::*;

        let status = match &e {
            AccountNotFound(_) => StatusCode::NOT_FOUND,
            InvalidAmount(_) | InvalidAddress(_) => StatusCode::BAD_REQUEST,
            AmountTooSmall(_) | NoFundsToSweep(_) | InsufficientFunds { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PreviouslyFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OperationInProgress { .. } | NeedsReview { .. } | IdempotencyConflict(_) => {
                StatusCode::CONFLICT
            }
            QuoteUnavailable(_) | Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TransferFailed(_) => StatusCode::BAD_GATEWAY,
            CreditFailed { .. } | CompensationFailed { .. } | Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::warn!(code = e.code(), error = %e, "Settlement request failed");
        }

        Self::new(status, e.code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code.to_string(),
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

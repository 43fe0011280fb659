// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    models::WithdrawRequest,
    settlement::{AccountSummary, SettlementReceipt},
    state::AppState,
    storage::{OperationKind, OperationStage, SettlementOperation},
};

pub mod accounts;
pub mod health;
pub mod settlement;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/{account_id}", get(accounts::get_account))
        .route("/accounts/{account_id}/sweep", post(settlement::sweep))
        .route(
            "/accounts/{account_id}/withdrawals",
            post(settlement::withdraw),
        )
        .route("/operations/{operation_id}", get(settlement::get_operation));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        accounts::create_account,
        accounts::get_account,
        settlement::sweep,
        settlement::withdraw,
        settlement::get_operation
    ),
    components(
        schemas(
            AccountSummary,
            SettlementReceipt,
            SettlementOperation,
            OperationKind,
            OperationStage,
            WithdrawRequest,
            ErrorBody,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Accounts", description = "Custodial deposit accounts"),
        (name = "Settlement", description = "Deposit sweeps and withdrawals")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::testing::Harness;
    use alloy::primitives::U256;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const ONE_ETH: u64 = 1_000_000_000_000_000_000;

    fn app(h: &Harness) -> Router {
        router(AppState::new(
            h.engine.clone(),
            h.ledger.clone(),
            h.custody.clone(),
        ))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn decimal(value: &Value) -> Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_with_treasury() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["treasury"], "ok");
    }

    #[tokio::test]
    async fn opened_account_can_be_fetched() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(
                Request::post("/v1/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let account_id = created["account_id"].as_str().unwrap().to_string();

        let response = app(&h)
            .oneshot(
                Request::get(format!("/v1/accounts/{account_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json_body(response).await;
        assert_eq!(fetched["address"], created["address"]);
        assert_eq!(decimal(&fetched["balance"]), Decimal::ZERO);
    }

    #[tokio::test]
    async fn unknown_account_is_404() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(
                Request::get("/v1/accounts/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "account_not_found");
    }

    #[tokio::test]
    async fn sweep_credits_and_replays_by_key() {
        let h = Harness::new();
        let account = h.funded_account(U256::from(ONE_ETH));
        let uri = format!("/v1/accounts/{}/sweep", account.account_id);

        let request = || {
            Request::post(uri.as_str())
                .header("idempotency-key", "deposit-1")
                .body(Body::empty())
                .unwrap()
        };

        let response = app(&h).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        assert_eq!(decimal(&first["balance"]), dec!(2997));

        let response = app(&h).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = json_body(response).await;
        assert_eq!(second["operation_id"], first["operation_id"]);
        assert_eq!(second["replayed"], true);
        assert_eq!(h.gateway.transfers().len(), 1);

        let operation_uri = format!(
            "/v1/operations/{}",
            first["operation_id"].as_str().unwrap()
        );
        let response = app(&h)
            .oneshot(Request::get(operation_uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["stage"], "completed");
    }

    #[tokio::test]
    async fn empty_deposit_is_unprocessable() {
        let h = Harness::new();
        let account = h.funded_account(U256::ZERO);
        let response = app(&h)
            .oneshot(
                Request::post(format!("/v1/accounts/{}/sweep", account.account_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "no_funds_to_sweep");
    }

    #[tokio::test]
    async fn withdrawal_pays_out() {
        let h = Harness::new();
        let account = h.credited_account(dec!(3000));
        let destination = "0x742d35cc6634c0532925a3b844bc9e7595f4ab12";

        let response = app(&h)
            .oneshot(post_json(
                &format!("/v1/accounts/{}/withdrawals", account.account_id),
                serde_json::json!({ "destination": destination, "amount": "1500" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(decimal(&receipt["balance"]), dec!(1500));
        assert!(receipt["tx_hash"].as_str().is_some());

        let transfers = h.gateway.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].to, destination);
        assert_eq!(transfers[0].amount, U256::from(ONE_ETH / 2));
    }

    #[tokio::test]
    async fn withdrawal_rejects_bad_requests() {
        let h = Harness::new();
        let account = h.credited_account(dec!(10));
        let uri = format!("/v1/accounts/{}/withdrawals", account.account_id);

        let response = app(&h)
            .oneshot(post_json(
                &uri,
                serde_json::json!({ "destination": "not-an-address", "amount": "1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid_address");

        let response = app(&h)
            .oneshot(post_json(
                &uri,
                serde_json::json!({
                    "destination": "0x742d35cc6634c0532925a3b844bc9e7595f4ab12",
                    "amount": "11"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "insufficient_funds");
        assert_eq!(h.ledger.balance(&account.account_id).unwrap(), dec!(10));
        assert!(h.gateway.transfers().is_empty());
    }

    #[tokio::test]
    async fn sweep_finishes_after_client_disconnects() {
        let h = Harness::new();
        let account = h.funded_account(U256::from(ONE_ETH));
        h.gateway.delay_transfers(Duration::from_millis(200));

        let request = Request::post(format!("/v1/accounts/{}/sweep", account.account_id))
            .header("idempotency-key", "gone-1")
            .body(Body::empty())
            .unwrap();
        let outcome = tokio::time::timeout(Duration::from_millis(50), app(&h).oneshot(request)).await;
        assert!(outcome.is_err(), "request should still be waiting on the chain");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let op = h.ledger.find_by_idempotency_key("gone-1").unwrap().unwrap();
        assert_eq!(op.stage, OperationStage::Completed);
        assert_eq!(h.gateway.transfers().len(), 1);
        assert_eq!(h.ledger.balance(&account.account_id).unwrap(), dec!(2997));
    }

    #[tokio::test]
    async fn withdrawal_finishes_after_client_disconnects() {
        let h = Harness::new();
        let account = h.credited_account(dec!(3000));
        h.gateway.delay_transfers(Duration::from_millis(200));

        let mut request = post_json(
            &format!("/v1/accounts/{}/withdrawals", account.account_id),
            serde_json::json!({
                "destination": "0x742d35cc6634c0532925a3b844bc9e7595f4ab12",
                "amount": "300"
            }),
        );
        request
            .headers_mut()
            .insert("idempotency-key", "gone-2".parse().unwrap());
        let outcome = tokio::time::timeout(Duration::from_millis(50), app(&h).oneshot(request)).await;
        assert!(outcome.is_err(), "request should still be waiting on the chain");

        tokio::time::sleep(Duration::from_millis(400)).await;
        let op = h.ledger.find_by_idempotency_key("gone-2").unwrap().unwrap();
        assert_eq!(op.stage, OperationStage::Completed);
        assert_eq!(h.ledger.balance(&account.account_id).unwrap(), dec!(2700));
    }

    #[tokio::test]
    async fn unknown_operation_is_404() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(
                Request::get("/v1/operations/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn openapi_lists_settlement_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/accounts/{account_id}/sweep"));
        assert!(doc.paths.paths.contains_key("/v1/accounts/{account_id}/withdrawals"));
    }
}

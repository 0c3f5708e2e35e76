//! Operational endpoints and shared response types.

use crate::state::ApiContext;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use greekdash_core::GreekDashError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// Map a domain error to an HTTP status and JSON body.
pub fn error_response(err: GreekDashError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        GreekDashError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
        GreekDashError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        GreekDashError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        GreekDashError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        GreekDashError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        GreekDashError::WebhookSignature => (StatusCode::BAD_REQUEST, "invalid_signature"),
        GreekDashError::Billing(_) => (StatusCode::BAD_REQUEST, "billing_error"),
        GreekDashError::Messaging(_) => (StatusCode::BAD_REQUEST, "messaging_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "Request failed");
        metrics::counter!("api.errors").increment(1);
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: ctx.config.node_id.clone(),
        uptime_secs: ctx.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

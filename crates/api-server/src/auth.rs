//! Bearer-token auth middleware and the per-chapter permission gate.
//!
//! Every request outside the public list must carry a valid session
//! token. Tenant-scoped handlers then check the membership embedded in
//! the session against the chapter slug from the path.

use crate::rest::ErrorResponse;
use crate::state::ApiContext;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use greekdash_core::ChapterRole;
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::{self, AccessDecision, Permission};

/// Routes reachable without a session.
fn is_public(path: &str) -> bool {
    path == "/health"
        || path == "/ready"
        || path == "/live"
        || path.starts_with("/api/v1/auth/register")
        || path.starts_with("/api/v1/auth/login")
        || path == "/api/v1/billing/webhook"
        || path == "/api/v1/billing/plans"
}

/// Axum middleware validating the `Authorization: Bearer` header and
/// attaching the session to the request.
pub async fn auth_middleware(State(ctx): State<ApiContext>, mut req: Request, next: Next) -> Response {
    if is_public(req.uri().path()) {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.and_then(|t| ctx.auth.validate(t)) {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            metrics::counter!("api.auth_rejections").increment(1);
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized".to_string(),
                    message: "valid bearer token required".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Require a permission in the chapter named by the path slug. Returns the
/// caller's role so handlers can apply finer checks (e.g. owner-only).
pub fn require(
    session: &Session,
    chapter_slug: &str,
    permission: Permission,
) -> Result<ChapterRole, (StatusCode, Json<ErrorResponse>)> {
    let role = session.role_in(chapter_slug);
    match rbac::check(role, permission) {
        AccessDecision::Allowed => Ok(role.expect("allowed implies a role")),
        AccessDecision::Denied { required } => {
            metrics::counter!("api.permission_denials").increment(1);
            Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse {
                    error: "forbidden".to_string(),
                    message: format!("requires permission: {required:?}"),
                }),
            ))
        }
    }
}

/// Owner-only gate for ownership transfer.
pub fn require_owner(
    session: &Session,
    chapter_slug: &str,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if session.role_in(chapter_slug) == Some(ChapterRole::Owner) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "forbidden".to_string(),
                message: "only the chapter owner may do this".to_string(),
            }),
        ))
    }
}

//! Account endpoints: register, login, logout, and session introspection.

use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use greekdash_core::GreekDashError;
use greekdash_platform::auth::{MembershipClaim, Session};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub memberships: Vec<MembershipClaim>,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), (StatusCode, Json<ErrorResponse>)> {
    let user = ctx
        .users
        .register(&req.email, &req.name, req.phone.as_deref(), &req.password)
        .map_err(error_response)?;
    metrics::counter!("api.users_registered").increment(1);
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
        }),
    ))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = ctx
        .users
        .verify_password(&req.email, &req.password)
        .ok_or_else(|| {
            error_response(GreekDashError::Unauthorized("invalid credentials".into()))
        })?;

    let claims = ctx.claims_for(user.id);
    let session = ctx
        .auth
        .create_session(user.id, claims, ctx.config.session.ttl_hours);

    Ok(Json(LoginResponse {
        token: session.token,
        user_id: user.id,
        expires_at: session.expires_at,
        memberships: session.memberships,
    }))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> StatusCode {
    ctx.auth.revoke(&session.token);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub memberships: Vec<MembershipClaim>,
}

/// GET /api/v1/me
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> Result<Json<MeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = ctx
        .users
        .get(session.user_id)
        .ok_or_else(|| error_response(GreekDashError::NotFound("user".into())))?;
    Ok(Json(MeResponse {
        user: UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
        },
        memberships: ctx.claims_for(session.user_id),
    }))
}

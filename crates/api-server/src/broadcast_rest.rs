//! Broadcast endpoints: send bulk messages to a chapter audience and
//! inspect the delivery log.

use crate::auth::require;
use crate::chapter_rest::lookup_chapter;
use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use greekdash_core::GreekDashError;
use greekdash_messaging::broadcast::{
    Audience, Broadcast, BroadcastChannel, BroadcastSummary, MessageLogEntry, Recipient,
};
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::Permission;
use serde::Deserialize;
use uuid::Uuid;

type HandlerError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
pub struct SendBroadcastRequest {
    pub subject: String,
    pub body: String,
    pub channels: Vec<BroadcastChannel>,
    pub audience: Audience,
}

/// POST /api/v1/chapters/:slug/broadcasts
pub async fn send_broadcast(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<SendBroadcastRequest>,
) -> Result<(StatusCode, Json<BroadcastSummary>), HandlerError> {
    require(&session, &slug, Permission::BroadcastSend)?;
    let chapter = lookup_chapter(&ctx, &slug)?;

    if req.channels.is_empty() {
        return Err(error_response(GreekDashError::Validation(
            "at least one channel is required".into(),
        )));
    }
    if req.body.trim().is_empty() {
        return Err(error_response(GreekDashError::Validation(
            "broadcast body must not be empty".into(),
        )));
    }

    let recipients = resolve_recipients(&ctx, chapter.id, &req.audience);
    if recipients.is_empty() {
        return Err(error_response(GreekDashError::Validation(
            "audience resolved to no recipients".into(),
        )));
    }

    let summary = ctx
        .broadcaster
        .send_broadcast(
            chapter.id,
            session.user_id,
            &req.subject,
            &req.body,
            &req.channels,
            req.audience,
            &recipients,
        )
        .await;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "broadcast.send",
        "broadcast",
        &summary.broadcast_id.to_string(),
        serde_json::json!({
            "subject": req.subject,
            "recipients": summary.recipients,
            "sent": summary.sent,
            "failed": summary.failed,
        }),
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/v1/chapters/:slug/broadcasts
pub async fn list_broadcasts(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Broadcast>>, HandlerError> {
    require(&session, &slug, Permission::BroadcastSend)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.broadcaster.list_for_chapter(chapter.id)))
}

/// GET /api/v1/chapters/:slug/broadcasts/:id/log
pub async fn broadcast_log(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, broadcast_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<MessageLogEntry>>, HandlerError> {
    require(&session, &slug, Permission::BroadcastSend)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let broadcast = ctx
        .broadcaster
        .get_broadcast(broadcast_id)
        .filter(|b| b.chapter_id == chapter.id)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("broadcast: {broadcast_id}"))))?;
    Ok(Json(ctx.broadcaster.log_for_broadcast(broadcast.id)))
}

/// Resolve an audience to concrete recipients with contact details.
fn resolve_recipients(ctx: &ApiContext, chapter_id: Uuid, audience: &Audience) -> Vec<Recipient> {
    ctx.memberships
        .list_for_chapter(chapter_id)
        .into_iter()
        .filter(|m| m.role.is_active())
        .filter(|m| match audience {
            Audience::AllMembers => true,
            Audience::AdminsOnly => m.role.is_admin(),
            Audience::Users(ids) => ids.contains(&m.user_id),
        })
        .filter_map(|m| {
            ctx.users.get(m.user_id).map(|u| Recipient {
                user_id: u.id,
                name: u.name,
                email: Some(u.email),
                phone: u.phone,
            })
        })
        .collect()
}

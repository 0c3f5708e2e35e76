//! Event and RSVP endpoints.

use crate::auth::require;
use crate::chapter_rest::lookup_chapter;
use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use greekdash_core::GreekDashError;
use greekdash_events::models::{
    CreateEventRequest, Event, EventRsvp, RsvpStatus, RsvpSummary, UpdateEventRequest,
};
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::Permission;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// GET /api/v1/chapters/:slug/events
pub async fn list_events(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Event>>, HandlerError> {
    require(&session, &slug, Permission::EventView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.events.list_for_chapter(chapter.id)))
}

/// POST /api/v1/chapters/:slug/events
pub async fn create_event(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), HandlerError> {
    require(&session, &slug, Permission::EventManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let event = ctx
        .events
        .create_event(chapter.id, req, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "event.create",
        "event",
        &event.id.to_string(),
        serde_json::json!({ "title": event.title }),
    );
    metrics::counter!("api.events_created").increment(1);
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub rsvps: RsvpSummary,
}

/// GET /api/v1/chapters/:slug/events/:id
pub async fn get_event(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
) -> Result<Json<EventDetail>, HandlerError> {
    require(&session, &slug, Permission::EventView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let event = chapter_event(&ctx, chapter.id, event_id)?;
    let rsvps = ctx.events.rsvp_summary(event.id);
    Ok(Json(EventDetail { event, rsvps }))
}

/// PUT /api/v1/chapters/:slug/events/:id
pub async fn update_event(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<Event>, HandlerError> {
    require(&session, &slug, Permission::EventManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_event(&ctx, chapter.id, event_id)?;
    let event = ctx.events.update_event(event_id, req).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "event.update",
        "event",
        &event.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(event))
}

/// POST /api/v1/chapters/:slug/events/:id/cancel
pub async fn cancel_event(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
) -> Result<Json<Event>, HandlerError> {
    require(&session, &slug, Permission::EventManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_event(&ctx, chapter.id, event_id)?;
    let event = ctx
        .events
        .cancel_event(event_id)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("event: {event_id}"))))?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "event.cancel",
        "event",
        &event.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(event))
}

/// DELETE /api/v1/chapters/:slug/events/:id
pub async fn delete_event(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, HandlerError> {
    require(&session, &slug, Permission::EventManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_event(&ctx, chapter.id, event_id)?;

    if ctx.events.delete_event(event_id) {
        ctx.audit.log_action(
            chapter.id,
            Some(session.user_id),
            "event.delete",
            "event",
            &event_id.to_string(),
            serde_json::json!({}),
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(GreekDashError::NotFound(format!("event: {event_id}"))))
    }
}

#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
    pub status: RsvpStatus,
}

/// POST /api/v1/chapters/:slug/events/:id/rsvp
pub async fn rsvp(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
    Json(req): Json<RsvpRequest>,
) -> Result<Json<EventRsvp>, HandlerError> {
    require(&session, &slug, Permission::RsvpSelf)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_event(&ctx, chapter.id, event_id)?;

    let rsvp = ctx
        .events
        .rsvp(event_id, session.user_id, req.status)
        .map_err(error_response)?;
    metrics::counter!("api.rsvps").increment(1);
    Ok(Json(rsvp))
}

/// GET /api/v1/chapters/:slug/events/:id/rsvps
pub async fn list_rsvps(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, event_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<EventRsvp>>, HandlerError> {
    require(&session, &slug, Permission::EventView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_event(&ctx, chapter.id, event_id)?;
    Ok(Json(ctx.events.list_rsvps(event_id)))
}

fn chapter_event(ctx: &ApiContext, chapter_id: Uuid, event_id: Uuid) -> Result<Event, HandlerError> {
    let event = ctx
        .events
        .get_event(event_id)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("event: {event_id}"))))?;
    if event.chapter_id != chapter_id {
        return Err(error_response(GreekDashError::NotFound(format!("event: {event_id}"))));
    }
    Ok(event)
}

//! Chapter, membership, and invite endpoints.

use crate::auth::{require, require_owner};
use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use greekdash_core::{ChapterRole, GreekDashError, PlanTier};
use greekdash_directory::membership::Membership;
use greekdash_platform::audit::AuditEntry;
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::Permission;
use greekdash_platform::tenancy::{Chapter, ChapterStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type HandlerError = (StatusCode, Json<ErrorResponse>);

// ─── Chapters ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateChapterRequest {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChapterResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: ChapterStatus,
    pub plan: PlanTier,
    /// Only present for chapter admins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn chapter_response(chapter: Chapter, include_join_code: bool) -> ChapterResponse {
    ChapterResponse {
        id: chapter.id,
        name: chapter.name,
        slug: chapter.slug,
        status: chapter.status,
        plan: chapter.plan,
        join_code: include_join_code.then_some(chapter.join_code),
        created_at: chapter.created_at,
    }
}

/// POST /api/v1/chapters — sign up a new chapter; the caller becomes owner.
pub async fn create_chapter(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreateChapterRequest>,
) -> Result<(StatusCode, Json<ChapterResponse>), HandlerError> {
    let chapter = ctx
        .chapters
        .create_chapter(&req.name, req.slug.as_deref())
        .map_err(error_response)?;
    ctx.memberships
        .add_member(chapter.id, session.user_id, ChapterRole::Owner)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "chapter.create",
        "chapter",
        &chapter.id.to_string(),
        serde_json::json!({ "name": chapter.name, "slug": chapter.slug }),
    );
    ctx.refresh_claims(session.user_id);
    metrics::counter!("api.chapters_created").increment(1);

    Ok((StatusCode::CREATED, Json(chapter_response(chapter, true))))
}

/// GET /api/v1/chapters/:slug
pub async fn get_chapter(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<ChapterResponse>, HandlerError> {
    let role = require(&session, &slug, Permission::ChapterView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(chapter_response(chapter, role.is_admin())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateChapterRequest {
    pub name: String,
}

/// PUT /api/v1/chapters/:slug
pub async fn update_chapter(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<UpdateChapterRequest>,
) -> Result<Json<ChapterResponse>, HandlerError> {
    require(&session, &slug, Permission::ChapterManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let updated = ctx
        .chapters
        .rename(chapter.id, &req.name)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("chapter: {slug}"))))?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "chapter.update",
        "chapter",
        &chapter.id.to_string(),
        serde_json::json!({ "name": req.name }),
    );
    Ok(Json(chapter_response(updated, true)))
}

#[derive(Debug, Serialize)]
pub struct JoinCodeResponse {
    pub join_code: String,
}

/// POST /api/v1/chapters/:slug/join-code/rotate
pub async fn rotate_join_code(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<JoinCodeResponse>, HandlerError> {
    require(&session, &slug, Permission::ChapterManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let join_code = ctx
        .chapters
        .rotate_join_code(chapter.id)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("chapter: {slug}"))))?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "chapter.rotate_join_code",
        "chapter",
        &chapter.id.to_string(),
        serde_json::json!({}),
    );
    Ok(Json(JoinCodeResponse { join_code }))
}

// ─── Join flow ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub join_code: String,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub membership_id: Uuid,
    pub chapter_id: Uuid,
    pub user_id: Uuid,
    pub role: ChapterRole,
    pub joined_at: DateTime<Utc>,
}

fn membership_response(m: &Membership) -> MembershipResponse {
    MembershipResponse {
        membership_id: m.id,
        chapter_id: m.chapter_id,
        user_id: m.user_id,
        role: m.role,
        joined_at: m.created_at,
    }
}

/// POST /api/v1/chapters/:slug/join — request membership with a join code.
pub async fn join_chapter(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), HandlerError> {
    let chapter = ctx
        .chapters
        .verify_join_code(&slug, &req.join_code)
        .map_err(error_response)?;
    let membership = ctx
        .memberships
        .request_join(chapter.id, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "member.request_join",
        "membership",
        &membership.id.to_string(),
        serde_json::json!({}),
    );
    ctx.refresh_claims(session.user_id);
    metrics::counter!("api.join_requests").increment(1);

    Ok((StatusCode::CREATED, Json(membership_response(&membership))))
}

// ─── Members ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: ChapterRole,
    pub joined_at: DateTime<Utc>,
}

fn member_views(ctx: &ApiContext, memberships: Vec<Membership>) -> Vec<MemberView> {
    memberships
        .into_iter()
        .filter_map(|m| {
            ctx.users.get(m.user_id).map(|u| MemberView {
                membership_id: m.id,
                user_id: m.user_id,
                name: u.name,
                email: u.email,
                role: m.role,
                joined_at: m.created_at,
            })
        })
        .collect()
}

/// GET /api/v1/chapters/:slug/members
pub async fn list_members(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<MemberView>>, HandlerError> {
    require(&session, &slug, Permission::MemberView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let members = ctx
        .memberships
        .list_for_chapter(chapter.id)
        .into_iter()
        .filter(|m| m.role.is_active())
        .collect();
    Ok(Json(member_views(&ctx, members)))
}

/// GET /api/v1/chapters/:slug/members/pending
pub async fn list_pending_members(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<MemberView>>, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(member_views(&ctx, ctx.memberships.list_pending(chapter.id))))
}

/// POST /api/v1/chapters/:slug/members/:id/approve
pub async fn approve_member(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, membership_id)): Path<(String, Uuid)>,
) -> Result<Json<MembershipResponse>, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_membership(&ctx, chapter.id, membership_id)?;

    let active = ctx.memberships.active_member_count(chapter.id);
    let within = ctx
        .chapters
        .within_member_quota(chapter.id, active)
        .map_err(error_response)?;
    if !within {
        return Err(error_response(GreekDashError::Conflict(
            "member limit reached for the current plan".into(),
        )));
    }

    let membership = ctx.memberships.approve(membership_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "member.approve",
        "membership",
        &membership.id.to_string(),
        serde_json::json!({ "user_id": membership.user_id }),
    );
    ctx.refresh_claims(membership.user_id);
    metrics::counter!("api.members_approved").increment(1);

    Ok(Json(membership_response(&membership)))
}

/// POST /api/v1/chapters/:slug/members/:id/deny
pub async fn deny_member(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, membership_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_membership(&ctx, chapter.id, membership_id)?;

    let denied = ctx.memberships.deny(membership_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "member.deny",
        "membership",
        &membership_id.to_string(),
        serde_json::json!({ "user_id": denied.user_id }),
    );
    ctx.refresh_claims(denied.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: ChapterRole,
}

/// PUT /api/v1/chapters/:slug/members/:id/role
pub async fn change_member_role(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, membership_id)): Path<(String, Uuid)>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<MembershipResponse>, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_membership(&ctx, chapter.id, membership_id)?;

    let membership = ctx
        .memberships
        .change_role(membership_id, req.role)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "member.change_role",
        "membership",
        &membership.id.to_string(),
        serde_json::json!({ "role": membership.role }),
    );
    ctx.refresh_claims(membership.user_id);
    Ok(Json(membership_response(&membership)))
}

/// DELETE /api/v1/chapters/:slug/members/:id
pub async fn remove_member(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, membership_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_membership(&ctx, chapter.id, membership_id)?;

    let removed = ctx.memberships.remove(membership_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "member.remove",
        "membership",
        &membership_id.to_string(),
        serde_json::json!({ "user_id": removed.user_id }),
    );
    ctx.refresh_claims(removed.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    pub membership_id: Uuid,
}

/// POST /api/v1/chapters/:slug/transfer-ownership — owner only.
pub async fn transfer_ownership(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<TransferOwnershipRequest>,
) -> Result<Json<MembershipResponse>, HandlerError> {
    require_owner(&session, &slug)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    chapter_membership(&ctx, chapter.id, req.membership_id)?;

    let new_owner = ctx
        .memberships
        .transfer_ownership(chapter.id, req.membership_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "chapter.transfer_ownership",
        "membership",
        &new_owner.id.to_string(),
        serde_json::json!({ "new_owner": new_owner.user_id }),
    );
    ctx.refresh_claims(session.user_id);
    ctx.refresh_claims(new_owner.user_id);
    Ok(Json(membership_response(&new_owner)))
}

// ─── Invites ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: Option<String>,
    pub role: ChapterRole,
    #[serde(default = "default_invite_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_invite_ttl_hours() -> i64 {
    72
}

/// POST /api/v1/chapters/:slug/invites
pub async fn create_invite(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<greekdash_directory::invites::Invite>), HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;

    let invite = ctx
        .invites
        .create(chapter.id, req.email.as_deref(), req.role, req.ttl_hours, session.user_id)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "invite.create",
        "invite",
        &invite.id.to_string(),
        serde_json::json!({ "role": invite.role, "email": invite.email }),
    );
    Ok((StatusCode::CREATED, Json(invite)))
}

/// GET /api/v1/chapters/:slug/invites
pub async fn list_invites(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<greekdash_directory::invites::Invite>>, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.invites.list_for_chapter(chapter.id)))
}

/// DELETE /api/v1/chapters/:slug/invites/:id
pub async fn revoke_invite(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path((slug, invite_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, HandlerError> {
    require(&session, &slug, Permission::MemberManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let belongs = ctx
        .invites
        .list_for_chapter(chapter.id)
        .iter()
        .any(|i| i.id == invite_id);
    if !belongs {
        return Err(error_response(GreekDashError::NotFound(format!("invite: {invite_id}"))));
    }
    ctx.invites.revoke(invite_id).map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "invite.revoke",
        "invite",
        &invite_id.to_string(),
        serde_json::json!({}),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RedeemInviteRequest {
    pub token: String,
}

/// POST /api/v1/invites/redeem — accept an invite, creating a membership.
pub async fn redeem_invite(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Json(req): Json<RedeemInviteRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), HandlerError> {
    let invite = ctx
        .invites
        .redeem(&req.token, session.user_id)
        .map_err(error_response)?;

    let active = ctx.memberships.active_member_count(invite.chapter_id);
    let within = ctx
        .chapters
        .within_member_quota(invite.chapter_id, active)
        .map_err(error_response)?;
    if !within {
        return Err(error_response(GreekDashError::Conflict(
            "member limit reached for the current plan".into(),
        )));
    }

    let membership = ctx
        .memberships
        .add_member(invite.chapter_id, session.user_id, invite.role)
        .map_err(error_response)?;

    ctx.audit.log_action(
        invite.chapter_id,
        Some(session.user_id),
        "invite.redeem",
        "membership",
        &membership.id.to_string(),
        serde_json::json!({ "invite_id": invite.id, "role": invite.role }),
    );
    ctx.refresh_claims(session.user_id);
    Ok((StatusCode::CREATED, Json(membership_response(&membership))))
}

// ─── Audit log ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    100
}

/// GET /api/v1/chapters/:slug/audit-log
pub async fn audit_log(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, HandlerError> {
    require(&session, &slug, Permission::AuditView)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.audit.query(
        chapter.id,
        query.from,
        query.to,
        query.action.as_deref(),
        query.limit,
    )))
}

// ─── Helpers ───────────────────────────────────────────────────────────────

pub(crate) fn lookup_chapter(ctx: &ApiContext, slug: &str) -> Result<Chapter, HandlerError> {
    ctx.chapters
        .get_by_slug(slug)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("chapter: {slug}"))))
}

/// Ensure a membership id belongs to the chapter in the path.
fn chapter_membership(
    ctx: &ApiContext,
    chapter_id: Uuid,
    membership_id: Uuid,
) -> Result<Membership, HandlerError> {
    let membership = ctx
        .memberships
        .get(membership_id)
        .ok_or_else(|| error_response(GreekDashError::NotFound(format!("membership: {membership_id}"))))?;
    if membership.chapter_id != chapter_id {
        return Err(error_response(GreekDashError::NotFound(format!(
            "membership: {membership_id}"
        ))));
    }
    Ok(membership)
}

//! Billing endpoints: plan catalog, subscription state, checkout/portal
//! sessions, and the provider webhook.

use crate::auth::require;
use crate::chapter_rest::lookup_chapter;
use crate::rest::{error_response, ErrorResponse};
use crate::state::ApiContext;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use greekdash_billing::billing::{PaymentRecord, PlanInfo, Subscription};
use greekdash_billing::checkout::{CheckoutSession, PortalSession};
use greekdash_billing::WebhookOutcome;
use greekdash_core::{GreekDashError, PlanTier};
use greekdash_platform::auth::Session;
use greekdash_platform::rbac::Permission;
use serde::{Deserialize, Serialize};

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// GET /api/v1/billing/plans — public plan catalog.
pub async fn list_plans(State(ctx): State<ApiContext>) -> Json<Vec<PlanInfo>> {
    Json(ctx.billing.plan_catalog())
}

/// GET /api/v1/chapters/:slug/billing/subscription
pub async fn get_subscription(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Option<Subscription>>, HandlerError> {
    require(&session, &slug, Permission::BillingManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.billing.get_subscription(chapter.id)))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: PlanTier,
}

/// POST /api/v1/chapters/:slug/billing/checkout
pub async fn create_checkout(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), HandlerError> {
    require(&session, &slug, Permission::BillingManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let checkout = ctx
        .checkout
        .create_checkout_session(chapter.id, &chapter.slug, req.plan)
        .map_err(error_response)?;

    ctx.audit.log_action(
        chapter.id,
        Some(session.user_id),
        "billing.checkout_start",
        "checkout_session",
        &checkout.id,
        serde_json::json!({ "plan": req.plan }),
    );
    Ok((StatusCode::CREATED, Json(checkout)))
}

/// POST /api/v1/chapters/:slug/billing/portal
pub async fn create_portal(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<(StatusCode, Json<PortalSession>), HandlerError> {
    require(&session, &slug, Permission::BillingManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    let portal = ctx
        .checkout
        .create_portal_session(chapter.id, chapter.billing_customer_id.as_deref())
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(portal)))
}

/// GET /api/v1/chapters/:slug/billing/payments
pub async fn list_payments(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<PaymentRecord>>, HandlerError> {
    require(&session, &slug, Permission::BillingManage)?;
    let chapter = lookup_chapter(&ctx, &slug)?;
    Ok(Json(ctx.billing.list_payments(chapter.id)))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// POST /api/v1/billing/webhook — provider webhook endpoint.
///
/// Verifies the signature header against the raw body, maps the event to
/// local records, and applies any plan change to the chapter registry.
pub async fn webhook(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, HandlerError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| error_response(GreekDashError::WebhookSignature))?;

    let outcome = ctx.webhooks.handle(&body, signature).map_err(error_response)?;

    match outcome {
        WebhookOutcome::PlanChanged { chapter_id, plan } => {
            ctx.chapters.set_plan(chapter_id, plan);
            ctx.audit.log_action(
                chapter_id,
                None,
                "billing.plan_changed",
                "subscription",
                &chapter_id.to_string(),
                serde_json::json!({ "plan": plan }),
            );
        }
        WebhookOutcome::SubscriptionSynced { chapter_id } => {
            ctx.audit.log_action(
                chapter_id,
                None,
                "billing.subscription_synced",
                "subscription",
                &chapter_id.to_string(),
                serde_json::json!({}),
            );
        }
        WebhookOutcome::PaymentRecorded { chapter_id } => {
            ctx.audit.log_action(
                chapter_id,
                None,
                "billing.payment_recorded",
                "payment",
                &chapter_id.to_string(),
                serde_json::json!({}),
            );
        }
        WebhookOutcome::AlreadyProcessed | WebhookOutcome::Ignored { .. } => {}
    }

    Ok(Json(WebhookResponse { received: true }))
}

//! API server: router assembly and HTTP/metrics startup.

use crate::state::ApiContext;
use crate::{auth, auth_rest, billing_rest, broadcast_rest, chapter_rest, event_rest, finance_rest, rest};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full application router.
pub fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        // Operational
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Accounts & sessions
        .route("/api/v1/auth/register", post(auth_rest::register))
        .route("/api/v1/auth/login", post(auth_rest::login))
        .route("/api/v1/auth/logout", post(auth_rest::logout))
        .route("/api/v1/me", get(auth_rest::me))
        // Chapters
        .route("/api/v1/chapters", post(chapter_rest::create_chapter))
        .route(
            "/api/v1/chapters/:slug",
            get(chapter_rest::get_chapter).put(chapter_rest::update_chapter),
        )
        .route(
            "/api/v1/chapters/:slug/join-code/rotate",
            post(chapter_rest::rotate_join_code),
        )
        .route("/api/v1/chapters/:slug/join", post(chapter_rest::join_chapter))
        // Members
        .route("/api/v1/chapters/:slug/members", get(chapter_rest::list_members))
        .route(
            "/api/v1/chapters/:slug/members/pending",
            get(chapter_rest::list_pending_members),
        )
        .route(
            "/api/v1/chapters/:slug/members/:id/approve",
            post(chapter_rest::approve_member),
        )
        .route(
            "/api/v1/chapters/:slug/members/:id/deny",
            post(chapter_rest::deny_member),
        )
        .route(
            "/api/v1/chapters/:slug/members/:id/role",
            put(chapter_rest::change_member_role),
        )
        .route(
            "/api/v1/chapters/:slug/members/:id",
            axum::routing::delete(chapter_rest::remove_member),
        )
        .route(
            "/api/v1/chapters/:slug/transfer-ownership",
            post(chapter_rest::transfer_ownership),
        )
        // Invites
        .route(
            "/api/v1/chapters/:slug/invites",
            get(chapter_rest::list_invites).post(chapter_rest::create_invite),
        )
        .route(
            "/api/v1/chapters/:slug/invites/:id",
            axum::routing::delete(chapter_rest::revoke_invite),
        )
        .route("/api/v1/invites/redeem", post(chapter_rest::redeem_invite))
        // Audit log
        .route("/api/v1/chapters/:slug/audit-log", get(chapter_rest::audit_log))
        // Events
        .route(
            "/api/v1/chapters/:slug/events",
            get(event_rest::list_events).post(event_rest::create_event),
        )
        .route(
            "/api/v1/chapters/:slug/events/:id",
            get(event_rest::get_event)
                .put(event_rest::update_event)
                .delete(event_rest::delete_event),
        )
        .route(
            "/api/v1/chapters/:slug/events/:id/cancel",
            post(event_rest::cancel_event),
        )
        .route("/api/v1/chapters/:slug/events/:id/rsvp", post(event_rest::rsvp))
        .route(
            "/api/v1/chapters/:slug/events/:id/rsvps",
            get(event_rest::list_rsvps),
        )
        // Finance
        .route(
            "/api/v1/chapters/:slug/finance/budgets",
            get(finance_rest::list_budgets).post(finance_rest::create_budget),
        )
        .route(
            "/api/v1/chapters/:slug/finance/expenses",
            get(finance_rest::list_expenses).post(finance_rest::submit_expense),
        )
        .route(
            "/api/v1/chapters/:slug/finance/expenses/:id/approve",
            post(finance_rest::approve_expense),
        )
        .route(
            "/api/v1/chapters/:slug/finance/expenses/:id/deny",
            post(finance_rest::deny_expense),
        )
        .route(
            "/api/v1/chapters/:slug/finance/expenses/:id/reimburse",
            post(finance_rest::reimburse_expense),
        )
        .route(
            "/api/v1/chapters/:slug/finance/dues",
            get(finance_rest::list_dues).post(finance_rest::assign_dues),
        )
        .route("/api/v1/chapters/:slug/finance/dues/mine", get(finance_rest::my_dues))
        .route(
            "/api/v1/chapters/:slug/finance/dues/:id/pay",
            post(finance_rest::mark_dues_paid),
        )
        .route(
            "/api/v1/chapters/:slug/finance/dues/:id/waive",
            post(finance_rest::waive_dues),
        )
        .route("/api/v1/chapters/:slug/finance/balance", get(finance_rest::balance))
        .route(
            "/api/v1/chapters/:slug/finance/transactions",
            get(finance_rest::list_transactions),
        )
        .route(
            "/api/v1/chapters/:slug/finance/adjustments",
            post(finance_rest::record_adjustment),
        )
        // Billing
        .route("/api/v1/billing/plans", get(billing_rest::list_plans))
        .route("/api/v1/billing/webhook", post(billing_rest::webhook))
        .route(
            "/api/v1/chapters/:slug/billing/subscription",
            get(billing_rest::get_subscription),
        )
        .route(
            "/api/v1/chapters/:slug/billing/checkout",
            post(billing_rest::create_checkout),
        )
        .route(
            "/api/v1/chapters/:slug/billing/portal",
            post(billing_rest::create_portal),
        )
        .route(
            "/api/v1/chapters/:slug/billing/payments",
            get(billing_rest::list_payments),
        )
        // Broadcasts
        .route(
            "/api/v1/chapters/:slug/broadcasts",
            get(broadcast_rest::list_broadcasts).post(broadcast_rest::send_broadcast),
        )
        .route(
            "/api/v1/chapters/:slug/broadcasts/:id/log",
            get(broadcast_rest::broadcast_log),
        )
        // Middleware
        .layer(middleware::from_fn_with_state(ctx.clone(), auth::auth_middleware))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Main API server managing the HTTP listener and metrics exporter.
pub struct ApiServer {
    ctx: ApiContext,
}

impl ApiServer {
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Start the HTTP server. Blocks until shutdown.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(
            self.ctx.config.api.host.parse()?,
            self.ctx.config.api.http_port,
        );
        let app = build_router(self.ctx.clone());

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Start the Prometheus metrics exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.ctx.config.api.host.parse()?,
                self.ctx.config.metrics.port,
            ))
            .install()?;

        info!(port = self.ctx.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

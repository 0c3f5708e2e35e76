//! Shared application state wiring all subsystems together.

use greekdash_billing::{BillingEngine, CheckoutService, WebhookProcessor};
use greekdash_core::AppConfig;
use greekdash_directory::{InviteManager, MembershipStore, UserDirectory};
use greekdash_events::EventStore;
use greekdash_finance::FinanceStore;
use greekdash_messaging::{Broadcaster, ResendProvider, TwilioSmsProvider};
use greekdash_platform::auth::MembershipClaim;
use greekdash_platform::{AuditLogger, AuthManager, ChapterManager};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Shared state for every REST handler.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<AppConfig>,
    pub chapters: Arc<ChapterManager>,
    pub users: Arc<UserDirectory>,
    pub memberships: Arc<MembershipStore>,
    pub invites: Arc<InviteManager>,
    pub events: Arc<EventStore>,
    pub finance: Arc<FinanceStore>,
    pub billing: Arc<BillingEngine>,
    pub checkout: Arc<CheckoutService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub email: Arc<ResendProvider>,
    pub sms: Arc<TwilioSmsProvider>,
    pub broadcaster: Arc<Broadcaster>,
    pub audit: Arc<AuditLogger>,
    pub auth: Arc<AuthManager>,
    pub start_time: Instant,
}

impl ApiContext {
    /// Wire up every subsystem from configuration.
    pub fn new(config: AppConfig) -> Self {
        let billing = Arc::new(BillingEngine::new());
        let email = Arc::new(ResendProvider::new(config.email.clone()));
        let sms = Arc::new(TwilioSmsProvider::new(config.sms.clone()));
        let broadcaster = Arc::new(Broadcaster::new(
            email.clone(),
            sms.clone(),
            config.broadcast.batch_size,
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            &config.billing.webhook_secret,
            billing.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(config.billing.clone()));

        Self {
            config: Arc::new(config),
            chapters: Arc::new(ChapterManager::new()),
            users: Arc::new(UserDirectory::new()),
            memberships: Arc::new(MembershipStore::new()),
            invites: Arc::new(InviteManager::new()),
            events: Arc::new(EventStore::new()),
            finance: Arc::new(FinanceStore::new()),
            billing,
            checkout,
            webhooks,
            email,
            sms,
            broadcaster,
            audit: Arc::new(AuditLogger::new()),
            auth: Arc::new(AuthManager::new()),
            start_time: Instant::now(),
        }
    }

    /// Membership claims for a user, resolved to chapter slugs.
    pub fn claims_for(&self, user_id: Uuid) -> Vec<MembershipClaim> {
        self.memberships
            .list_for_user(user_id)
            .into_iter()
            .filter_map(|m| {
                self.chapters.get(m.chapter_id).map(|c| MembershipClaim {
                    chapter_slug: c.slug,
                    role: m.role,
                })
            })
            .collect()
    }

    /// Push fresh membership claims into every live session of a user.
    pub fn refresh_claims(&self, user_id: Uuid) {
        let claims = self.claims_for(user_id);
        self.auth.refresh_memberships(user_id, claims);
    }
}

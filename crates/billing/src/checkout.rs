//! Checkout and billing-portal session creation.
//!
//! Builds provider request payloads and returns the session URLs the
//! front end redirects to. The HTTP call to the provider is stubbed; in
//! production this POSTs to the provider's sessions endpoints.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::config::BillingConfig;
use greekdash_core::{GreekDashError, GreekDashResult, PlanTier};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// A checkout session for upgrading a chapter's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub chapter_id: Uuid,
    pub plan: PlanTier,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A billing-portal session for managing an existing subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub chapter_id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Builds provider checkout and portal sessions.
pub struct CheckoutService {
    config: BillingConfig,
    sessions: DashMap<String, CheckoutSession>,
}

impl CheckoutService {
    pub fn new(config: BillingConfig) -> Self {
        info!("Checkout service initialized");
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Create a subscription checkout session for a paid plan.
    pub fn create_checkout_session(
        &self,
        chapter_id: Uuid,
        chapter_slug: &str,
        plan: PlanTier,
    ) -> GreekDashResult<CheckoutSession> {
        if plan == PlanTier::Free {
            return Err(GreekDashError::Billing(
                "the free plan does not require checkout".into(),
            ));
        }

        // Provider request payload (in production: POST /v1/checkout/sessions).
        let _payload = serde_json::json!({
            "mode": "subscription",
            "line_items": [{
                "price_data": {
                    "lookup_key": plan.to_string(),
                    "unit_amount": plan.monthly_price_cents(),
                    "currency": "usd",
                    "recurring": { "interval": "month" }
                },
                "quantity": 1
            }],
            "success_url": self.config.checkout_success_url,
            "cancel_url": self.config.checkout_cancel_url,
            "metadata": {
                "chapter_id": chapter_id,
                "chapter_slug": chapter_slug,
                "plan": plan.to_string()
            }
        });

        let id = generate_session_id("cs_test_");
        let session = CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{id}"),
            id,
            chapter_id,
            plan,
            created_at: Utc::now(),
        };

        debug!(
            chapter_id = %chapter_id,
            plan = %plan,
            session_id = %session.id,
            "Checkout session created"
        );
        metrics::counter!("billing.checkout_sessions_created").increment(1);

        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Create a billing-portal session. Requires a provider customer id,
    /// which exists once the chapter has completed a checkout.
    pub fn create_portal_session(
        &self,
        chapter_id: Uuid,
        billing_customer_id: Option<&str>,
    ) -> GreekDashResult<PortalSession> {
        let customer_id = billing_customer_id.ok_or_else(|| {
            GreekDashError::Billing("chapter has no billing customer yet".into())
        })?;

        let _payload = serde_json::json!({
            "customer": customer_id,
            "return_url": self.config.portal_return_url,
        });

        let id = generate_session_id("bps_test_");
        let session = PortalSession {
            url: format!("https://billing.stripe.com/p/session/{id}"),
            id,
            chapter_id,
            created_at: Utc::now(),
        };

        debug!(chapter_id = %chapter_id, session_id = %session.id, "Portal session created");
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Option<CheckoutSession> {
        self.sessions.get(id).map(|e| e.value().clone())
    }
}

fn generate_session_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_session_for_paid_plan() {
        let service = CheckoutService::new(BillingConfig::default());
        let chapter = Uuid::new_v4();

        let session = service
            .create_checkout_session(chapter, "alpha-beta", PlanTier::Basic)
            .unwrap();
        assert!(session.id.starts_with("cs_test_"));
        assert!(session.url.contains(&session.id));
        assert_eq!(session.plan, PlanTier::Basic);

        let fetched = service.get_session(&session.id).unwrap();
        assert_eq!(fetched.chapter_id, chapter);
    }

    #[test]
    fn test_free_plan_rejected() {
        let service = CheckoutService::new(BillingConfig::default());
        let err = service
            .create_checkout_session(Uuid::new_v4(), "alpha-beta", PlanTier::Free)
            .unwrap_err();
        assert!(matches!(err, GreekDashError::Billing(_)));
    }

    #[test]
    fn test_portal_requires_customer() {
        let service = CheckoutService::new(BillingConfig::default());
        let chapter = Uuid::new_v4();

        assert!(service.create_portal_session(chapter, None).is_err());

        let session = service
            .create_portal_session(chapter, Some("cus_123"))
            .unwrap();
        assert!(session.id.starts_with("bps_test_"));
    }
}

//! Provider webhook handling: signature verification and event-to-record
//! mapping.
//!
//! The signature header has the form `t=<unix>,v1=<hex>` where `v1` is
//! HMAC-SHA256 over `"{t}.{payload}"` keyed by the webhook secret.
//! Timestamps older than the tolerance window are rejected. Processed
//! event ids are remembered so replays are acknowledged without touching
//! records again.

use crate::billing::{BillingEngine, PaymentStatus, SubscriptionStatus};
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use greekdash_core::{GreekDashError, GreekDashResult, PlanTier};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// A verified provider event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    fn object(&self) -> &serde_json::Value {
        &self.data["object"]
    }

    /// Chapter id from the object's metadata.
    fn chapter_id(&self) -> GreekDashResult<Uuid> {
        self.object()["metadata"]["chapter_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                GreekDashError::Billing("chapter_id missing from event metadata".into())
            })
    }
}

/// What a processed event did to local state. The caller applies any plan
/// change to the chapter registry and writes the audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    PlanChanged { chapter_id: Uuid, plan: PlanTier },
    SubscriptionSynced { chapter_id: Uuid },
    PaymentRecorded { chapter_id: Uuid },
    AlreadyProcessed,
    Ignored { event_type: String },
}

/// Verifies and processes provider webhook deliveries.
pub struct WebhookProcessor {
    secret: String,
    engine: Arc<BillingEngine>,
    processed: DashMap<String, DateTime<Utc>>,
}

impl WebhookProcessor {
    pub fn new(secret: &str, engine: Arc<BillingEngine>) -> Self {
        Self {
            secret: secret.to_string(),
            engine,
            processed: DashMap::new(),
        }
    }

    /// Verify the signature header against the raw payload.
    pub fn verify_signature(&self, payload: &str, header: &str) -> GreekDashResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(GreekDashError::WebhookSignature)?;
        let v1_signature = v1_signature.ok_or(GreekDashError::WebhookSignature)?;

        let now = Utc::now().timestamp();
        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            warn!(timestamp, now, "Webhook timestamp outside tolerance");
            return Err(GreekDashError::WebhookSignature);
        }

        let expected = compute_signature(&self.secret, timestamp, payload)
            .map_err(|_| GreekDashError::WebhookSignature)?;
        if expected != v1_signature {
            warn!("Webhook signature mismatch");
            metrics::counter!("billing.webhook_signature_failures").increment(1);
            return Err(GreekDashError::WebhookSignature);
        }
        Ok(())
    }

    /// Verify, parse, and apply a webhook delivery.
    pub fn handle(&self, payload: &str, signature_header: &str) -> GreekDashResult<WebhookOutcome> {
        self.verify_signature(payload, signature_header)?;

        let event: WebhookEvent = serde_json::from_str(payload)?;

        if self.processed.contains_key(&event.id) {
            info!(event_id = %event.id, "Duplicate webhook event, skipping");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = self.apply(&event)?;
        self.processed.insert(event.id.clone(), Utc::now());
        metrics::counter!(
            "billing.webhook_events",
            "type" => event.event_type.clone()
        )
        .increment(1);
        Ok(outcome)
    }

    fn apply(&self, event: &WebhookEvent) -> GreekDashResult<WebhookOutcome> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let chapter_id = event.chapter_id()?;
                let plan = self.plan_from_metadata(event)?;
                let subscription_id = event.object()["subscription"].as_str();

                self.engine.upsert_subscription(
                    chapter_id,
                    subscription_id,
                    plan,
                    SubscriptionStatus::Active,
                    period_end(event.object()),
                    false,
                );
                info!(chapter_id = %chapter_id, plan = %plan, "Checkout completed");
                Ok(WebhookOutcome::PlanChanged { chapter_id, plan })
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let chapter_id = event.chapter_id()?;
                let object = event.object();
                let status = object["status"]
                    .as_str()
                    .map(SubscriptionStatus::from_provider)
                    .unwrap_or(SubscriptionStatus::Active);
                let cancel_at_period_end =
                    object["cancel_at_period_end"].as_bool().unwrap_or(false);
                let subscription_id = object["id"].as_str();

                match self.plan_from_metadata(event) {
                    Ok(plan) => {
                        self.engine.upsert_subscription(
                            chapter_id,
                            subscription_id,
                            plan,
                            status,
                            period_end(object),
                            cancel_at_period_end,
                        );
                        Ok(WebhookOutcome::PlanChanged { chapter_id, plan })
                    }
                    // No plan in metadata: sync status onto the existing mirror.
                    Err(_) => {
                        self.engine.set_status(chapter_id, status);
                        Ok(WebhookOutcome::SubscriptionSynced { chapter_id })
                    }
                }
            }
            "customer.subscription.deleted" => {
                let chapter_id = event.chapter_id()?;
                self.engine.mark_cancelled(chapter_id);
                info!(chapter_id = %chapter_id, "Subscription deleted, downgrading to free");
                Ok(WebhookOutcome::PlanChanged {
                    chapter_id,
                    plan: PlanTier::Free,
                })
            }
            "invoice.paid" => {
                let chapter_id = event.chapter_id()?;
                let object = event.object();
                self.engine.record_payment(
                    chapter_id,
                    object["id"].as_str().unwrap_or(&event.id),
                    object["amount_paid"].as_i64().unwrap_or(0),
                    object["currency"].as_str().unwrap_or("usd"),
                    PaymentStatus::Paid,
                );
                Ok(WebhookOutcome::PaymentRecorded { chapter_id })
            }
            "invoice.payment_failed" => {
                let chapter_id = event.chapter_id()?;
                let object = event.object();
                self.engine.record_payment(
                    chapter_id,
                    object["id"].as_str().unwrap_or(&event.id),
                    object["amount_due"].as_i64().unwrap_or(0),
                    object["currency"].as_str().unwrap_or("usd"),
                    PaymentStatus::Failed,
                );
                self.engine.set_status(chapter_id, SubscriptionStatus::PastDue);
                warn!(chapter_id = %chapter_id, "Invoice payment failed");
                Ok(WebhookOutcome::PaymentRecorded { chapter_id })
            }
            other => {
                info!(event_type = %other, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    fn plan_from_metadata(&self, event: &WebhookEvent) -> GreekDashResult<PlanTier> {
        event.object()["metadata"]["plan"]
            .as_str()
            .and_then(PlanTier::from_lookup_key)
            .ok_or_else(|| GreekDashError::Billing("plan missing from event metadata".into()))
    }
}

fn period_end(object: &serde_json::Value) -> Option<DateTime<Utc>> {
    object["current_period_end"]
        .as_i64()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> Result<String, hmac::digest::InvalidLength> {
    let key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a signature header for a payload. Used by tests and local
/// webhook replay tooling.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let signature = compute_signature(secret, timestamp, payload)
        .expect("HMAC accepts any key length");
    format!("t={timestamp},v1={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn processor() -> (WebhookProcessor, Arc<BillingEngine>) {
        let engine = Arc::new(BillingEngine::new());
        (WebhookProcessor::new(SECRET, engine.clone()), engine)
    }

    fn checkout_payload(event_id: &str, chapter_id: Uuid, plan: &str) -> String {
        serde_json::json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "subscription": "sub_abc",
                    "current_period_end": (Utc::now() + chrono::Duration::days(30)).timestamp(),
                    "metadata": {
                        "chapter_id": chapter_id.to_string(),
                        "plan": plan
                    }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let (processor, _) = processor();
        let payload = r#"{"id":"evt_1","type":"noop","created":0,"data":{}}"#;
        let header = sign_payload(SECRET, Utc::now().timestamp(), payload);
        assert!(processor.verify_signature(payload, &header).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (processor, _) = processor();
        let payload = r#"{"id":"evt_1","type":"noop","created":0,"data":{}}"#;
        let header = sign_payload(SECRET, Utc::now().timestamp(), payload);

        let tampered = payload.replace("evt_1", "evt_2");
        let err = processor.verify_signature(&tampered, &header).unwrap_err();
        assert!(matches!(err, GreekDashError::WebhookSignature));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let (processor, _) = processor();
        let payload = r#"{"id":"evt_1","type":"noop","created":0,"data":{}}"#;
        let stale = Utc::now().timestamp() - TIMESTAMP_TOLERANCE_SECS - 60;
        let header = sign_payload(SECRET, stale, payload);
        assert!(processor.verify_signature(payload, &header).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        let (processor, _) = processor();
        assert!(processor.verify_signature("{}", "v1=abc").is_err());
        assert!(processor.verify_signature("{}", "t=123").is_err());
        assert!(processor.verify_signature("{}", "garbage").is_err());
    }

    #[test]
    fn test_checkout_completed_sets_plan() {
        let (processor, engine) = processor();
        let chapter = Uuid::new_v4();
        let payload = checkout_payload("evt_checkout_1", chapter, "pro");
        let header = sign_payload(SECRET, Utc::now().timestamp(), &payload);

        let outcome = processor.handle(&payload, &header).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::PlanChanged {
                chapter_id: chapter,
                plan: PlanTier::Pro
            }
        );

        let sub = engine.get_subscription(chapter).unwrap();
        assert_eq!(sub.plan, PlanTier::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.provider_subscription_id, Some("sub_abc".to_string()));
    }

    #[test]
    fn test_replayed_event_not_reprocessed() {
        let (processor, _) = processor();
        let chapter = Uuid::new_v4();
        let payload = checkout_payload("evt_replay", chapter, "basic");
        let header = sign_payload(SECRET, Utc::now().timestamp(), &payload);

        let first = processor.handle(&payload, &header).unwrap();
        assert!(matches!(first, WebhookOutcome::PlanChanged { .. }));

        let second = processor.handle(&payload, &header).unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);
    }

    #[test]
    fn test_subscription_deleted_downgrades() {
        let (processor, engine) = processor();
        let chapter = Uuid::new_v4();

        // Establish a pro subscription first.
        let payload = checkout_payload("evt_up", chapter, "pro");
        let header = sign_payload(SECRET, Utc::now().timestamp(), &payload);
        processor.handle(&payload, &header).unwrap();

        let deleted = serde_json::json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": "sub_abc",
                    "metadata": { "chapter_id": chapter.to_string() }
                }
            }
        })
        .to_string();
        let header = sign_payload(SECRET, Utc::now().timestamp(), &deleted);

        let outcome = processor.handle(&deleted, &header).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::PlanChanged {
                chapter_id: chapter,
                plan: PlanTier::Free
            }
        );
        let sub = engine.get_subscription(chapter).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_invoice_payment_failed_marks_past_due() {
        let (processor, engine) = processor();
        let chapter = Uuid::new_v4();

        let payload = checkout_payload("evt_up2", chapter, "basic");
        let header = sign_payload(SECRET, Utc::now().timestamp(), &payload);
        processor.handle(&payload, &header).unwrap();

        let failed = serde_json::json!({
            "id": "evt_fail",
            "type": "invoice.payment_failed",
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": "in_100",
                    "amount_due": 2900,
                    "currency": "usd",
                    "metadata": { "chapter_id": chapter.to_string() }
                }
            }
        })
        .to_string();
        let header = sign_payload(SECRET, Utc::now().timestamp(), &failed);

        processor.handle(&failed, &header).unwrap();
        let sub = engine.get_subscription(chapter).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);

        let payments = engine.list_payments(chapter);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
    }

    #[test]
    fn test_unknown_event_ignored() {
        let (processor, _) = processor();
        let payload = serde_json::json!({
            "id": "evt_other",
            "type": "customer.tax_id.created",
            "created": Utc::now().timestamp(),
            "data": { "object": {} }
        })
        .to_string();
        let header = sign_payload(SECRET, Utc::now().timestamp(), &payload);

        let outcome = processor.handle(&payload, &header).unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "customer.tax_id.created".to_string()
            }
        );
    }
}

//! Subscription mirror and payment records.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::PlanTier;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Subscription lifecycle state, mirroring the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Cancelled,
    Paused,
}

impl SubscriptionStatus {
    /// Map a provider status string to the local enum. Unknown statuses
    /// fall back to `Active` with a warning.
    pub fn from_provider(status: &str) -> SubscriptionStatus {
        match status {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "cancelled" => SubscriptionStatus::Cancelled,
            "paused" => SubscriptionStatus::Paused,
            other => {
                warn!(status = %other, "Unknown provider subscription status");
                SubscriptionStatus::Active
            }
        }
    }
}

/// A chapter's subscription, one per chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub provider_subscription_id: Option<String>,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Failed,
}

/// A payment (invoice) record mirrored from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub provider_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A plan as presented to chapter admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInfo {
    pub tier: PlanTier,
    pub monthly_price_cents: i64,
    pub annual_price_cents: i64,
    pub member_limit: Option<u32>,
}

/// In-memory billing engine backed by `DashMap`.
pub struct BillingEngine {
    /// Keyed by chapter id; a chapter holds at most one subscription.
    subscriptions: DashMap<Uuid, Subscription>,
    payments: DashMap<Uuid, PaymentRecord>,
    /// provider invoice id -> payment record id, for upserts.
    invoice_index: DashMap<String, Uuid>,
}

impl Default for BillingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingEngine {
    pub fn new() -> Self {
        info!("BillingEngine initialized");
        Self {
            subscriptions: DashMap::new(),
            payments: DashMap::new(),
            invoice_index: DashMap::new(),
        }
    }

    /// The plan catalog.
    pub fn plan_catalog(&self) -> Vec<PlanInfo> {
        [PlanTier::Free, PlanTier::Basic, PlanTier::Pro]
            .into_iter()
            .map(|tier| PlanInfo {
                tier,
                monthly_price_cents: tier.monthly_price_cents(),
                annual_price_cents: tier.annual_price_cents(),
                member_limit: tier.member_limit(),
            })
            .collect()
    }

    /// Create or update the chapter's subscription from provider state.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_subscription(
        &self,
        chapter_id: Uuid,
        provider_subscription_id: Option<&str>,
        plan: PlanTier,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
    ) -> Subscription {
        let now = Utc::now();
        let mut entry = self.subscriptions.entry(chapter_id).or_insert_with(|| Subscription {
            id: Uuid::new_v4(),
            chapter_id,
            provider_subscription_id: None,
            plan,
            status,
            current_period_end: None,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        });
        if let Some(sid) = provider_subscription_id {
            entry.provider_subscription_id = Some(sid.to_string());
        }
        entry.plan = plan;
        entry.status = status;
        entry.current_period_end = current_period_end;
        entry.cancel_at_period_end = cancel_at_period_end;
        entry.updated_at = now;
        info!(chapter_id = %chapter_id, plan = %plan, status = ?status, "Subscription synced");
        entry.clone()
    }

    pub fn get_subscription(&self, chapter_id: Uuid) -> Option<Subscription> {
        self.subscriptions.get(&chapter_id).map(|e| e.value().clone())
    }

    /// Mark the subscription to cancel at the end of the current period.
    pub fn cancel_at_period_end(&self, chapter_id: Uuid) -> Option<Subscription> {
        self.subscriptions.get_mut(&chapter_id).map(|mut sub| {
            sub.cancel_at_period_end = true;
            sub.updated_at = Utc::now();
            info!(chapter_id = %chapter_id, "Subscription set to cancel at period end");
            sub.clone()
        })
    }

    /// Provider deleted the subscription: mark cancelled and drop to free.
    pub fn mark_cancelled(&self, chapter_id: Uuid) -> Option<Subscription> {
        self.subscriptions.get_mut(&chapter_id).map(|mut sub| {
            sub.status = SubscriptionStatus::Cancelled;
            sub.plan = PlanTier::Free;
            sub.updated_at = Utc::now();
            info!(chapter_id = %chapter_id, "Subscription cancelled, chapter downgraded");
            sub.clone()
        })
    }

    /// Update only the status (e.g. past_due after a failed invoice).
    pub fn set_status(&self, chapter_id: Uuid, status: SubscriptionStatus) -> Option<Subscription> {
        self.subscriptions.get_mut(&chapter_id).map(|mut sub| {
            sub.status = status;
            sub.updated_at = Utc::now();
            sub.clone()
        })
    }

    /// Record a payment, upserting on the provider invoice id.
    pub fn record_payment(
        &self,
        chapter_id: Uuid,
        provider_invoice_id: &str,
        amount_cents: i64,
        currency: &str,
        status: PaymentStatus,
    ) -> PaymentRecord {
        if let Some(existing_id) = self.invoice_index.get(provider_invoice_id).map(|e| *e.value()) {
            if let Some(mut entry) = self.payments.get_mut(&existing_id) {
                entry.status = status;
                entry.amount_cents = amount_cents;
                return entry.clone();
            }
        }

        let record = PaymentRecord {
            id: Uuid::new_v4(),
            chapter_id,
            provider_invoice_id: provider_invoice_id.to_string(),
            amount_cents,
            currency: currency.to_string(),
            status,
            created_at: Utc::now(),
        };
        self.invoice_index
            .insert(record.provider_invoice_id.clone(), record.id);
        self.payments.insert(record.id, record.clone());
        record
    }

    /// Payments for a chapter, newest first.
    pub fn list_payments(&self, chapter_id: Uuid) -> Vec<PaymentRecord> {
        let mut payments: Vec<PaymentRecord> = self
            .payments
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments
    }
}

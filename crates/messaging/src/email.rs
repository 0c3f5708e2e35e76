//! Resend email provider with delivery tracking.
//!
//! Sends transactional and broadcast email via the Resend API and
//! processes inbound delivery webhook events: delivered, bounced,
//! complained.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::config::EmailConfig;
use greekdash_core::{GreekDashError, GreekDashResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delivery state of one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Delivered,
    Bounced,
    Complained,
}

/// A sent email with delivery tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    pub status: EmailStatus,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery event types from the provider webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailEventType {
    Delivered,
    Bounced,
    Complained,
}

/// Resend email provider with an in-memory message store.
pub struct ResendProvider {
    config: EmailConfig,
    messages: DashMap<Uuid, EmailMessage>,
    /// provider_id -> message id for webhook lookups.
    provider_index: DashMap<String, Uuid>,
}

impl ResendProvider {
    pub fn new(config: EmailConfig) -> Self {
        info!(from = %config.from_email, "Resend provider initialized");
        Self {
            config,
            messages: DashMap::new(),
            provider_index: DashMap::new(),
        }
    }

    /// Send an email. In production: POST to https://api.resend.com/emails.
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> GreekDashResult<EmailMessage> {
        if !to.contains('@') {
            return Err(GreekDashError::Messaging(format!("invalid email address: {to}")));
        }

        debug!(to = %to, subject = %subject, "Sending email via Resend");

        // Provider request payload (stub; HTTP call in production).
        let _payload = serde_json::json!({
            "from": format!("{} <{}>", self.config.from_name, self.config.from_email),
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let now = Utc::now();
        let provider_id = format!("re_{}", Uuid::new_v4());
        let msg = EmailMessage {
            id: Uuid::new_v4(),
            to: to.to_string(),
            subject: subject.to_string(),
            status: EmailStatus::Queued,
            provider_id: Some(provider_id.clone()),
            created_at: now,
            updated_at: now,
        };

        metrics::counter!("email.messages_sent").increment(1);

        self.provider_index.insert(provider_id, msg.id);
        self.messages.insert(msg.id, msg.clone());
        Ok(msg)
    }

    /// Process a delivery webhook event. Returns `true` when the message
    /// was found and updated.
    pub fn process_delivery_event(&self, provider_id: &str, event: EmailEventType) -> bool {
        let message_id = match self.provider_index.get(provider_id) {
            Some(entry) => *entry.value(),
            None => {
                warn!(provider_id = %provider_id, "Delivery event for unknown provider_id");
                return false;
            }
        };

        if let Some(mut msg) = self.messages.get_mut(&message_id) {
            msg.status = match event {
                EmailEventType::Delivered => EmailStatus::Delivered,
                EmailEventType::Bounced => EmailStatus::Bounced,
                EmailEventType::Complained => EmailStatus::Complained,
            };
            msg.updated_at = Utc::now();
        } else {
            return false;
        }

        metrics::counter!(
            "email.delivery_events",
            "type" => format!("{event:?}")
        )
        .increment(1);
        true
    }

    pub fn get_message(&self, id: Uuid) -> Option<EmailMessage> {
        self.messages.get(&id).map(|m| m.clone())
    }

    /// Most recently sent messages, up to `limit`.
    pub fn list_messages(&self, limit: usize) -> Vec<EmailMessage> {
        let mut messages: Vec<EmailMessage> =
            self.messages.iter().map(|e| e.value().clone()).collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        messages
    }

    pub fn config(&self) -> &EmailConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ResendProvider {
        ResendProvider::new(EmailConfig::default())
    }

    #[tokio::test]
    async fn test_send_and_track() {
        let provider = provider();
        let msg = provider
            .send_email("member@example.com", "Chapter meeting", "<p>See you there</p>")
            .await
            .unwrap();

        assert_eq!(msg.status, EmailStatus::Queued);
        let provider_id = msg.provider_id.clone().unwrap();
        assert!(provider_id.starts_with("re_"));

        assert!(provider.process_delivery_event(&provider_id, EmailEventType::Delivered));
        assert_eq!(
            provider.get_message(msg.id).unwrap().status,
            EmailStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let provider = provider();
        let err = provider
            .send_email("not-an-address", "Subject", "<p>Body</p>")
            .await
            .unwrap_err();
        assert!(matches!(err, GreekDashError::Messaging(_)));
    }

    #[tokio::test]
    async fn test_bounce_event() {
        let provider = provider();
        let msg = provider
            .send_email("bounce@example.com", "Hello", "<p>Hi</p>")
            .await
            .unwrap();
        let provider_id = msg.provider_id.clone().unwrap();

        assert!(provider.process_delivery_event(&provider_id, EmailEventType::Bounced));
        assert_eq!(
            provider.get_message(msg.id).unwrap().status,
            EmailStatus::Bounced
        );

        // Unknown provider id is ignored.
        assert!(!provider.process_delivery_event("re_unknown", EmailEventType::Delivered));
    }
}

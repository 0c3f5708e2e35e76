//! Broadcast fan-out: admin-initiated bulk messages to a chapter audience
//! over email and/or SMS.
//!
//! Recipients are processed in fixed-size batches with concurrent sends
//! inside each batch. There is no retry or backpressure; per-recipient
//! failures are collected into the broadcast summary and every attempt is
//! written to the message log.

use crate::email::ResendProvider;
use crate::sms::TwilioSmsProvider;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Delivery channel for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastChannel {
    Email,
    Sms,
}

/// Which members receive a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_ids")]
pub enum Audience {
    AllMembers,
    AdminsOnly,
    Users(Vec<Uuid>),
}

/// A resolved recipient. Missing contact details for a requested channel
/// are reported as failures rather than silently skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A stored broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub subject: String,
    pub body: String,
    pub channels: Vec<BroadcastChannel>,
    pub audience: Audience,
    pub initiated_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One delivery record per recipient-channel attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: Uuid,
    pub broadcast_id: Uuid,
    pub chapter_id: Uuid,
    pub channel: BroadcastChannel,
    pub user_id: Uuid,
    /// Email address or phone number the attempt targeted, when present.
    pub recipient: Option<String>,
    pub status: DeliveryStatus,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome summary returned to the initiating admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub broadcast_id: Uuid,
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Fans broadcasts out to the channel providers.
pub struct Broadcaster {
    email: Arc<ResendProvider>,
    sms: Arc<TwilioSmsProvider>,
    batch_size: usize,
    broadcasts: DashMap<Uuid, Broadcast>,
    log: DashMap<Uuid, MessageLogEntry>,
}

impl Broadcaster {
    pub fn new(email: Arc<ResendProvider>, sms: Arc<TwilioSmsProvider>, batch_size: usize) -> Self {
        info!(batch_size, "Broadcaster initialized");
        Self {
            email,
            sms,
            batch_size: batch_size.max(1),
            broadcasts: DashMap::new(),
            log: DashMap::new(),
        }
    }

    /// Send a broadcast to the resolved recipients.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_broadcast(
        &self,
        chapter_id: Uuid,
        initiated_by: Uuid,
        subject: &str,
        body: &str,
        channels: &[BroadcastChannel],
        audience: Audience,
        recipients: &[Recipient],
    ) -> BroadcastSummary {
        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            chapter_id,
            subject: subject.to_string(),
            body: body.to_string(),
            channels: channels.to_vec(),
            audience,
            initiated_by,
            created_at: Utc::now(),
        };
        self.broadcasts.insert(broadcast.id, broadcast.clone());

        info!(
            broadcast_id = %broadcast.id,
            chapter_id = %chapter_id,
            recipients = recipients.len(),
            channels = ?channels,
            "Broadcast started"
        );

        let mut sent = 0usize;
        let mut failed = 0usize;
        let mut errors = Vec::new();

        // One work item per recipient-channel pair.
        let work: Vec<(Recipient, BroadcastChannel)> = recipients
            .iter()
            .flat_map(|r| channels.iter().map(move |c| (r.clone(), *c)))
            .collect();

        for batch in work.chunks(self.batch_size) {
            let mut tasks: JoinSet<(Uuid, BroadcastChannel, Option<String>, Result<String, String>)> =
                JoinSet::new();

            for (recipient, channel) in batch.iter().cloned() {
                let email = self.email.clone();
                let sms = self.sms.clone();
                let subject = broadcast.subject.clone();
                let body = broadcast.body.clone();

                tasks.spawn(async move {
                    match channel {
                        BroadcastChannel::Email => match &recipient.email {
                            Some(address) => {
                                let result = email
                                    .send_email(address, &subject, &body)
                                    .await
                                    .map(|m| m.provider_id.unwrap_or_default())
                                    .map_err(|e| e.to_string());
                                (recipient.user_id, channel, Some(address.clone()), result)
                            }
                            None => (
                                recipient.user_id,
                                channel,
                                None,
                                Err(format!("{}: no email address on file", recipient.name)),
                            ),
                        },
                        BroadcastChannel::Sms => match &recipient.phone {
                            Some(number) => {
                                let result = sms
                                    .send(number, &body)
                                    .await
                                    .map(|m| m.provider_id.unwrap_or_default())
                                    .map_err(|e| e.to_string());
                                (recipient.user_id, channel, Some(number.clone()), result)
                            }
                            None => (
                                recipient.user_id,
                                channel,
                                None,
                                Err(format!("{}: no phone number on file", recipient.name)),
                            ),
                        },
                    }
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let Ok((user_id, channel, recipient, result)) = joined else {
                    warn!("Broadcast send task panicked");
                    failed += 1;
                    errors.push("send task panicked".to_string());
                    continue;
                };

                let (status, provider_id, error) = match result {
                    Ok(provider_id) => {
                        sent += 1;
                        (DeliveryStatus::Sent, Some(provider_id), None)
                    }
                    Err(message) => {
                        failed += 1;
                        errors.push(message.clone());
                        (DeliveryStatus::Failed, None, Some(message))
                    }
                };

                let entry = MessageLogEntry {
                    id: Uuid::new_v4(),
                    broadcast_id: broadcast.id,
                    chapter_id,
                    channel,
                    user_id,
                    recipient,
                    status,
                    provider_id,
                    error,
                    created_at: Utc::now(),
                };
                self.log.insert(entry.id, entry);
            }
        }

        metrics::counter!("broadcast.messages_sent").increment(sent as u64);
        metrics::counter!("broadcast.messages_failed").increment(failed as u64);

        info!(
            broadcast_id = %broadcast.id,
            sent,
            failed,
            "Broadcast finished"
        );

        BroadcastSummary {
            broadcast_id: broadcast.id,
            recipients: recipients.len(),
            sent,
            failed,
            errors,
        }
    }

    pub fn get_broadcast(&self, id: Uuid) -> Option<Broadcast> {
        self.broadcasts.get(&id).map(|e| e.value().clone())
    }

    /// Broadcasts sent in a chapter, newest first.
    pub fn list_for_chapter(&self, chapter_id: Uuid) -> Vec<Broadcast> {
        let mut broadcasts: Vec<Broadcast> = self
            .broadcasts
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        broadcasts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        broadcasts
    }

    /// Delivery log for one broadcast.
    pub fn log_for_broadcast(&self, broadcast_id: Uuid) -> Vec<MessageLogEntry> {
        self.log
            .iter()
            .filter(|e| e.value().broadcast_id == broadcast_id)
            .map(|e| e.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greekdash_core::config::{EmailConfig, SmsConfig};

    fn broadcaster(batch_size: usize) -> Broadcaster {
        Broadcaster::new(
            Arc::new(ResendProvider::new(EmailConfig::default())),
            Arc::new(TwilioSmsProvider::new(SmsConfig::default())),
            batch_size,
        )
    }

    fn recipient(name: &str, email: Option<&str>, phone: Option<&str>) -> Recipient {
        Recipient {
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_email_broadcast_all_delivered() {
        let broadcaster = broadcaster(2);
        let recipients = vec![
            recipient("A", Some("a@example.com"), None),
            recipient("B", Some("b@example.com"), None),
            recipient("C", Some("c@example.com"), None),
        ];

        let summary = broadcaster
            .send_broadcast(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "Dues reminder",
                "Dues are due Friday.",
                &[BroadcastChannel::Email],
                Audience::AllMembers,
                &recipients,
            )
            .await;

        assert_eq!(summary.recipients, 3);
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.errors.is_empty());

        let log = broadcaster.log_for_broadcast(summary.broadcast_id);
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.status == DeliveryStatus::Sent));
    }

    #[tokio::test]
    async fn test_missing_contact_collected_as_error() {
        let broadcaster = broadcaster(25);
        let recipients = vec![
            recipient("Has both", Some("x@example.com"), Some("+15551230001")),
            recipient("No phone", Some("y@example.com"), None),
        ];

        let summary = broadcaster
            .send_broadcast(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "Formal",
                "Formal is Saturday.",
                &[BroadcastChannel::Email, BroadcastChannel::Sms],
                Audience::AllMembers,
                &recipients,
            )
            .await;

        // 2 recipients x 2 channels = 4 attempts; one has no phone.
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("no phone number"));

        let log = broadcaster.log_for_broadcast(summary.broadcast_id);
        assert_eq!(log.len(), 4);
        assert_eq!(
            log.iter().filter(|e| e.status == DeliveryStatus::Failed).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_provider_failure_does_not_abort_batch() {
        let broadcaster = broadcaster(25);
        let recipients = vec![
            recipient("Good", None, Some("+15551230001")),
            // Not E.164: the SMS provider rejects it.
            recipient("Bad number", None, Some("555-broken")),
            recipient("Also good", None, Some("+15551230002")),
        ];

        let summary = broadcaster
            .send_broadcast(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "Heads up",
                "Meeting moved to 8pm.",
                &[BroadcastChannel::Sms],
                Audience::AdminsOnly,
                &recipients,
            )
            .await;

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.errors[0].contains("E.164"));
    }

    #[tokio::test]
    async fn test_broadcast_listing() {
        let broadcaster = broadcaster(25);
        let chapter = Uuid::new_v4();
        let recipients = vec![recipient("A", Some("a@example.com"), None)];

        broadcaster
            .send_broadcast(
                chapter,
                Uuid::new_v4(),
                "One",
                "First",
                &[BroadcastChannel::Email],
                Audience::AllMembers,
                &recipients,
            )
            .await;
        broadcaster
            .send_broadcast(
                chapter,
                Uuid::new_v4(),
                "Two",
                "Second",
                &[BroadcastChannel::Email],
                Audience::Users(vec![recipients[0].user_id]),
                &recipients,
            )
            .await;

        let listed = broadcaster.list_for_chapter(chapter);
        assert_eq!(listed.len(), 2);
        assert!(broadcaster.list_for_chapter(Uuid::new_v4()).is_empty());
    }
}

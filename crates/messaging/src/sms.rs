//! Twilio SMS provider: sending, segment calculation, and delivery
//! status callbacks.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::config::SmsConfig;
use greekdash_core::{GreekDashError, GreekDashResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status of an SMS message through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
    Undelivered,
}

/// An SMS message with delivery tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    pub id: Uuid,
    pub to: String,
    pub from: String,
    pub body: String,
    pub status: SmsStatus,
    pub provider_id: Option<String>,
    pub segments: u32,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Twilio SMS provider with an in-memory message store.
pub struct TwilioSmsProvider {
    config: SmsConfig,
    messages: DashMap<Uuid, SmsMessage>,
    /// provider_id -> message id for status-callback lookups.
    provider_index: DashMap<String, Uuid>,
}

impl TwilioSmsProvider {
    pub fn new(config: SmsConfig) -> Self {
        info!(
            account_sid = %config.account_sid,
            from = %config.from_number,
            "Twilio SMS provider initialized"
        );
        Self {
            config,
            messages: DashMap::new(),
            provider_index: DashMap::new(),
        }
    }

    /// Send an SMS. In production: POST to the Twilio Messages endpoint.
    pub async fn send(&self, to: &str, body: &str) -> GreekDashResult<SmsMessage> {
        validate_e164(to)?;

        debug!(to = %to, "Sending SMS via Twilio");

        let _payload = serde_json::json!({
            "To": to,
            "From": self.config.from_number,
            "Body": body,
        });

        let now = Utc::now();
        let provider_id = format!("SM{}", Uuid::new_v4().simple());
        let msg = SmsMessage {
            id: Uuid::new_v4(),
            to: to.to_string(),
            from: self.config.from_number.clone(),
            body: body.to_string(),
            status: SmsStatus::Queued,
            provider_id: Some(provider_id.clone()),
            segments: segment_count(body),
            error_code: None,
            created_at: now,
            updated_at: now,
        };

        metrics::counter!("sms.messages_sent").increment(1);

        self.provider_index.insert(provider_id, msg.id);
        self.messages.insert(msg.id, msg.clone());
        Ok(msg)
    }

    /// Handle a Twilio status callback. Returns `true` when the message
    /// was found and updated.
    pub fn handle_status_callback(
        &self,
        provider_id: &str,
        status: &str,
        error_code: Option<&str>,
    ) -> bool {
        let message_id = match self.provider_index.get(provider_id) {
            Some(entry) => *entry.value(),
            None => {
                warn!(provider_id = %provider_id, "Status callback for unknown provider_id");
                return false;
            }
        };

        let new_status = match status {
            "queued" => SmsStatus::Queued,
            "sent" => SmsStatus::Sent,
            "delivered" => SmsStatus::Delivered,
            "failed" => SmsStatus::Failed,
            "undelivered" => SmsStatus::Undelivered,
            other => {
                warn!(status = %other, "Unknown SMS status in callback");
                return false;
            }
        };

        if let Some(mut msg) = self.messages.get_mut(&message_id) {
            msg.status = new_status;
            msg.error_code = error_code.map(|c| c.to_string());
            msg.updated_at = Utc::now();
        } else {
            return false;
        }

        metrics::counter!(
            "sms.status_callbacks",
            "status" => status.to_string()
        )
        .increment(1);
        true
    }

    pub fn get_message(&self, id: Uuid) -> Option<SmsMessage> {
        self.messages.get(&id).map(|m| m.clone())
    }

    /// Most recently sent messages, up to `limit`.
    pub fn list_messages(&self, limit: usize) -> Vec<SmsMessage> {
        let mut messages: Vec<SmsMessage> =
            self.messages.iter().map(|e| e.value().clone()).collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        messages
    }

    pub fn config(&self) -> &SmsConfig {
        &self.config
    }
}

/// Require E.164 format: leading `+`, 8-15 digits.
fn validate_e164(number: &str) -> GreekDashResult<()> {
    let digits = number.strip_prefix('+').unwrap_or("");
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(GreekDashError::Messaging(format!(
            "phone number must be E.164: {number}"
        )));
    }
    Ok(())
}

// GSM 03.38: 160 chars in one segment, 153 per segment when concatenated.
// UCS-2: 70 single, 67 concatenated.
const GSM_SINGLE: u32 = 160;
const GSM_MULTI: u32 = 153;
const UCS2_SINGLE: u32 = 70;
const UCS2_MULTI: u32 = 67;

/// Number of SMS segments a body occupies.
pub fn segment_count(body: &str) -> u32 {
    if body.is_empty() {
        return 1;
    }
    let chars = body.chars().count() as u32;
    let (single, multi) = if body.chars().all(is_gsm_char) {
        (GSM_SINGLE, GSM_MULTI)
    } else {
        (UCS2_SINGLE, UCS2_MULTI)
    };
    if chars <= single {
        1
    } else {
        chars.div_ceil(multi)
    }
}

/// Membership in the GSM 7-bit default alphabet (plus extension table).
fn is_gsm_char(c: char) -> bool {
    if c.is_ascii_alphanumeric() {
        return true;
    }
    // Basic punctuation, whitespace, and extension characters.
    " \n\r!\"#$%&'()*+,-./:;<=>?@_{}[]~\\^|".contains(c)
        // Accented letters and Greek capitals in the default alphabet.
        || "£¥èéùìòÇØøÅåÆæßÉÄÖÑÜäöñüà¤¡¿§ΔΦΓΛΩΠΨΣΘΞ€".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TwilioSmsProvider {
        TwilioSmsProvider::new(SmsConfig::default())
    }

    #[tokio::test]
    async fn test_send_and_callback() {
        let provider = provider();
        let msg = provider.send("+15559876543", "Meeting at 7pm").await.unwrap();

        assert_eq!(msg.status, SmsStatus::Queued);
        assert_eq!(msg.segments, 1);
        let provider_id = msg.provider_id.clone().unwrap();
        assert!(provider_id.starts_with("SM"));

        assert!(provider.handle_status_callback(&provider_id, "delivered", None));
        assert_eq!(
            provider.get_message(msg.id).unwrap().status,
            SmsStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_failed_callback_records_error_code() {
        let provider = provider();
        let msg = provider.send("+15559876543", "Hello").await.unwrap();
        let provider_id = msg.provider_id.clone().unwrap();

        assert!(provider.handle_status_callback(&provider_id, "failed", Some("30006")));
        let updated = provider.get_message(msg.id).unwrap();
        assert_eq!(updated.status, SmsStatus::Failed);
        assert_eq!(updated.error_code.as_deref(), Some("30006"));

        // Unknown provider id and unknown status are both rejected.
        assert!(!provider.handle_status_callback("SM_missing", "delivered", None));
        assert!(!provider.handle_status_callback(&provider_id, "teleported", None));
    }

    #[tokio::test]
    async fn test_invalid_number_rejected() {
        let provider = provider();
        assert!(provider.send("555-1234", "hi").await.is_err());
        assert!(provider.send("+1", "hi").await.is_err());
        assert!(provider.send("+1555abc4567", "hi").await.is_err());
    }

    #[test]
    fn test_segment_boundaries_gsm() {
        assert_eq!(segment_count(""), 1);
        assert_eq!(segment_count("short"), 1);
        assert_eq!(segment_count(&"A".repeat(160)), 1);
        // 161 chars spill into two 153-char segments.
        assert_eq!(segment_count(&"A".repeat(161)), 2);
        assert_eq!(segment_count(&"A".repeat(306)), 2);
        assert_eq!(segment_count(&"A".repeat(307)), 3);
    }

    #[test]
    fn test_segment_boundaries_unicode() {
        let emoji = "\u{1F389}";
        assert_eq!(segment_count(&emoji.repeat(10)), 1);
        assert_eq!(segment_count(&format!("{}{emoji}", "A".repeat(69))), 1);
        // 71 chars with a non-GSM char forces UCS-2: ceil(71/67) = 2.
        assert_eq!(segment_count(&format!("{}{emoji}", "A".repeat(70))), 2);
    }

    #[test]
    fn test_gsm_alphabet_edges() {
        // The euro sign is in the GSM extension table.
        assert_eq!(segment_count(&"€".repeat(100)), 1);
        // Curly quotes are not GSM.
        assert_eq!(segment_count(&"\u{2018}".repeat(100)), 2);
    }
}

//! Audit logging: denormalized per-chapter event records with free-form
//! JSON metadata and filtered queries.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub chapter_id: Uuid,
    /// The acting user; `None` for provider-driven changes (webhooks).
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log backed by DashMap.
pub struct AuditLogger {
    entries: DashMap<Uuid, AuditEntry>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new empty logger.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record an action against a chapter resource.
    pub fn log_action(
        &self,
        chapter_id: Uuid,
        actor_id: Option<Uuid>,
        action: &str,
        target_type: &str,
        target_id: &str,
        metadata: serde_json::Value,
    ) -> AuditEntry {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            chapter_id,
            actor_id,
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            metadata,
            timestamp: Utc::now(),
        };
        info!(
            chapter_id = %chapter_id,
            action = %entry.action,
            target = %entry.target_type,
            "Audit event recorded"
        );
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    /// Query entries for a chapter with optional time range and action
    /// filter, newest first, capped at `limit`.
    pub fn query(
        &self,
        chapter_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        action: Option<&str>,
        limit: usize,
    ) -> Vec<AuditEntry> {
        let mut results: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|e| {
                let entry = e.value();
                if entry.chapter_id != chapter_id {
                    return false;
                }
                if let Some(ref f) = from {
                    if entry.timestamp < *f {
                        return false;
                    }
                }
                if let Some(ref t) = to {
                    if entry.timestamp > *t {
                        return false;
                    }
                }
                if let Some(a) = action {
                    if entry.action != a {
                        return false;
                    }
                }
                true
            })
            .map(|e| e.value().clone())
            .collect();

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit);
        results
    }

    /// Total entries recorded for a chapter.
    pub fn count_for_chapter(&self, chapter_id: Uuid) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_query() {
        let logger = AuditLogger::new();
        let chapter_id = Uuid::new_v4();
        let actor = Uuid::new_v4();

        for action in &["member.approve", "member.remove", "event.create"] {
            logger.log_action(
                chapter_id,
                Some(actor),
                action,
                "membership",
                &Uuid::new_v4().to_string(),
                serde_json::json!({"test": true}),
            );
        }
        // Entry for an unrelated chapter must not appear.
        logger.log_action(
            Uuid::new_v4(),
            Some(actor),
            "member.approve",
            "membership",
            "other",
            serde_json::json!({}),
        );

        let all = logger.query(chapter_id, None, None, None, 100);
        assert_eq!(all.len(), 3);

        let approvals = logger.query(chapter_id, None, None, Some("member.approve"), 100);
        assert_eq!(approvals.len(), 1);

        assert_eq!(logger.count_for_chapter(chapter_id), 3);
    }

    #[test]
    fn test_query_limit_and_time_range() {
        let logger = AuditLogger::new();
        let chapter_id = Uuid::new_v4();

        for i in 0..10 {
            logger.log_action(
                chapter_id,
                None,
                "dues.paid",
                "dues_payment",
                &format!("dp-{i}"),
                serde_json::json!({}),
            );
        }

        let limited = logger.query(chapter_id, None, None, None, 5);
        assert_eq!(limited.len(), 5);

        // A window entirely in the past matches nothing.
        let past = logger.query(
            chapter_id,
            Some(Utc::now() - chrono::Duration::hours(2)),
            Some(Utc::now() - chrono::Duration::hours(1)),
            None,
            100,
        );
        assert!(past.is_empty());
    }
}

//! Session management: opaque bearer tokens carrying a snapshot of the
//! user's chapter memberships.
//!
//! Tokens are random and validated by store lookup. The membership claims
//! embedded in each session mirror the membership table at issue time and
//! are refreshed when memberships change.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use greekdash_core::ChapterRole;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const SESSION_TOKEN_PREFIX: &str = "gd_sess_";

/// One chapter membership as embedded in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipClaim {
    pub chapter_slug: String,
    pub role: ChapterRole,
}

/// An authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub memberships: Vec<MembershipClaim>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Role the session holds in the given chapter, if any.
    pub fn role_in(&self, chapter_slug: &str) -> Option<ChapterRole> {
        self.memberships
            .iter()
            .find(|m| m.chapter_slug == chapter_slug)
            .map(|m| m.role)
    }
}

/// Central session store.
pub struct AuthManager {
    sessions: DashMap<String, Session>,
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthManager {
    /// Create a new, empty manager.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Issue a new session for a user with the given membership snapshot.
    pub fn create_session(
        &self,
        user_id: Uuid,
        memberships: Vec<MembershipClaim>,
        ttl_hours: i64,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            token: generate_token(),
            user_id,
            memberships,
            issued_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        };

        info!(user_id = %user_id, "Session created");
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Validate a bearer token; returns `None` when unknown or expired.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let entry = self.sessions.get(token)?;
        if Utc::now() >= entry.expires_at {
            return None;
        }
        Some(entry.clone())
    }

    /// Revoke a session. Returns `true` when it existed.
    pub fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.remove(token).is_some();
        if removed {
            info!("Session revoked");
        }
        removed
    }

    /// Revoke every session belonging to a user. Returns the count removed.
    pub fn revoke_all_for_user(&self, user_id: Uuid) -> usize {
        let tokens: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.key().clone())
            .collect();
        for token in &tokens {
            self.sessions.remove(token);
        }
        tokens.len()
    }

    /// Replace the membership claims in every live session for a user,
    /// so role changes take effect without re-login.
    pub fn refresh_memberships(&self, user_id: Uuid, memberships: Vec<MembershipClaim>) {
        for mut entry in self.sessions.iter_mut() {
            if entry.value().user_id == user_id {
                entry.memberships = memberships.clone();
            }
        }
    }

    /// Count live (non-expired) sessions for a user.
    pub fn active_session_count(&self, user_id: Uuid) -> usize {
        let now = Utc::now();
        self.sessions
            .iter()
            .filter(|e| e.value().user_id == user_id && now < e.value().expires_at)
            .count()
    }
}

/// Generate an opaque random bearer token.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{SESSION_TOKEN_PREFIX}{}", hex::encode(bytes))
}

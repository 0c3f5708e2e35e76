//! Invite tokens: expiring, single-use links that grant a membership on
//! redemption.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use greekdash_core::{ChapterRole, GreekDashError, GreekDashResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const INVITE_TOKEN_PREFIX: &str = "gd_inv_";

/// A chapter invite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub token: String,
    /// Intended recipient, informational only; redemption is by token.
    pub email: Option<String>,
    /// Role granted on redemption (`Member` or `Admin`).
    pub role: ChapterRole,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by: Option<Uuid>,
}

impl Invite {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Invite store with a token lookup index.
pub struct InviteManager {
    invites: DashMap<Uuid, Invite>,
    token_index: DashMap<String, Uuid>,
}

impl Default for InviteManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InviteManager {
    pub fn new() -> Self {
        Self {
            invites: DashMap::new(),
            token_index: DashMap::new(),
        }
    }

    /// Create an invite valid for `ttl_hours`.
    pub fn create(
        &self,
        chapter_id: Uuid,
        email: Option<&str>,
        role: ChapterRole,
        ttl_hours: i64,
        created_by: Uuid,
    ) -> GreekDashResult<Invite> {
        if !matches!(role, ChapterRole::Member | ChapterRole::Admin) {
            return Err(GreekDashError::Validation(format!("invites cannot grant role: {role}")));
        }
        if ttl_hours <= 0 {
            return Err(GreekDashError::Validation("invite ttl must be positive".into()));
        }

        let now = Utc::now();
        let invite = Invite {
            id: Uuid::new_v4(),
            chapter_id,
            token: generate_invite_token(),
            email: email.map(|e| e.trim().to_lowercase()),
            role,
            created_by,
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
            consumed_at: None,
            consumed_by: None,
        };

        info!(invite_id = %invite.id, chapter_id = %chapter_id, role = %role, "Invite created");
        self.token_index.insert(invite.token.clone(), invite.id);
        self.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    /// Redeem an invite token. Consumes it and returns the invite; the
    /// caller creates the membership.
    pub fn redeem(&self, token: &str, user_id: Uuid) -> GreekDashResult<Invite> {
        let id = *self
            .token_index
            .get(token)
            .ok_or_else(|| GreekDashError::NotFound("invite token".into()))?
            .value();
        let mut entry = self
            .invites
            .get_mut(&id)
            .ok_or_else(|| GreekDashError::NotFound("invite token".into()))?;
        if entry.is_consumed() {
            return Err(GreekDashError::Validation("invite has already been used".into()));
        }
        if entry.is_expired() {
            return Err(GreekDashError::Validation("invite has expired".into()));
        }
        entry.consumed_at = Some(Utc::now());
        entry.consumed_by = Some(user_id);
        info!(invite_id = %entry.id, user_id = %user_id, "Invite redeemed");
        Ok(entry.clone())
    }

    /// List invites for a chapter, newest first.
    pub fn list_for_chapter(&self, chapter_id: Uuid) -> Vec<Invite> {
        let mut invites: Vec<Invite> = self
            .invites
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        invites
    }

    /// Revoke (delete) an unconsumed invite.
    pub fn revoke(&self, id: Uuid) -> GreekDashResult<()> {
        let invite = self
            .invites
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| GreekDashError::NotFound(format!("invite: {id}")))?;
        if invite.is_consumed() {
            return Err(GreekDashError::Validation("invite has already been used".into()));
        }
        self.token_index.remove(&invite.token);
        self.invites.remove(&id);
        info!(invite_id = %id, "Invite revoked");
        Ok(())
    }
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{INVITE_TOKEN_PREFIX}{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_redeem() {
        let mgr = InviteManager::new();
        let chapter = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let joiner = Uuid::new_v4();

        let invite = mgr
            .create(chapter, Some("new@example.com"), ChapterRole::Member, 72, admin)
            .unwrap();
        assert!(invite.token.starts_with(INVITE_TOKEN_PREFIX));
        assert!(!invite.is_expired());

        let redeemed = mgr.redeem(&invite.token, joiner).unwrap();
        assert_eq!(redeemed.chapter_id, chapter);
        assert_eq!(redeemed.role, ChapterRole::Member);
        assert_eq!(redeemed.consumed_by, Some(joiner));

        // Tokens are single-use.
        let err = mgr.redeem(&invite.token, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GreekDashError::Validation(_)));
    }

    #[test]
    fn test_unknown_token() {
        let mgr = InviteManager::new();
        let err = mgr.redeem("gd_inv_nope", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GreekDashError::NotFound(_)));
    }

    #[test]
    fn test_expired_invite_rejected() {
        let mgr = InviteManager::new();
        let chapter = Uuid::new_v4();
        let invite = mgr
            .create(chapter, None, ChapterRole::Member, 1, Uuid::new_v4())
            .unwrap();

        // Force expiry.
        mgr.invites.get_mut(&invite.id).unwrap().expires_at = Utc::now() - Duration::minutes(1);

        let err = mgr.redeem(&invite.token, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GreekDashError::Validation(_)));
    }

    #[test]
    fn test_invalid_roles_and_revoke() {
        let mgr = InviteManager::new();
        let chapter = Uuid::new_v4();
        let admin = Uuid::new_v4();

        assert!(mgr.create(chapter, None, ChapterRole::Owner, 24, admin).is_err());
        assert!(mgr.create(chapter, None, ChapterRole::PendingMember, 24, admin).is_err());

        let invite = mgr.create(chapter, None, ChapterRole::Admin, 24, admin).unwrap();
        mgr.revoke(invite.id).unwrap();
        assert!(mgr.redeem(&invite.token, Uuid::new_v4()).is_err());
    }
}

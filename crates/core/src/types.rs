//! Shared domain types: chapter roles and subscription plan tiers.

use serde::{Deserialize, Serialize};

/// Role a user holds within a chapter.
///
/// `PendingMember` is assigned when a join request is awaiting admin
/// approval; it grants no access to chapter resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterRole {
    Member,
    Admin,
    Owner,
    PendingMember,
}

impl ChapterRole {
    /// Whether this role counts as an active (approved) membership.
    pub fn is_active(self) -> bool {
        !matches!(self, ChapterRole::PendingMember)
    }

    /// Whether this role may manage members, finances, and broadcasts.
    pub fn is_admin(self) -> bool {
        matches!(self, ChapterRole::Admin | ChapterRole::Owner)
    }
}

impl std::fmt::Display for ChapterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChapterRole::Member => "member",
            ChapterRole::Admin => "admin",
            ChapterRole::Owner => "owner",
            ChapterRole::PendingMember => "pending_member",
        };
        write!(f, "{s}")
    }
}

/// Subscription plan tier, mirrored from the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
}

impl PlanTier {
    /// Maximum active members allowed on this tier. `None` means unlimited.
    pub fn member_limit(self) -> Option<u32> {
        match self {
            PlanTier::Free => Some(20),
            PlanTier::Basic => Some(75),
            PlanTier::Pro => None,
        }
    }

    /// Monthly price in cents.
    pub fn monthly_price_cents(self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Basic => 2_900,
            PlanTier::Pro => 7_900,
        }
    }

    /// Annual price in cents.
    pub fn annual_price_cents(self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Basic => 29_000,
            PlanTier::Pro => 79_000,
        }
    }

    /// Parse a provider price lookup key (e.g. from checkout metadata).
    pub fn from_lookup_key(key: &str) -> Option<PlanTier> {
        match key {
            "free" => Some(PlanTier::Free),
            "basic" => Some(PlanTier::Basic),
            "pro" => Some(PlanTier::Pro),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
        };
        write!(f, "{s}")
    }
}

//! Role-based access checks for chapter-scoped operations.
//!
//! Roles map to fixed permission sets; there is no custom-role engine.

use greekdash_core::ChapterRole;
use serde::{Deserialize, Serialize};

/// Fine-grained permission for chapter resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ChapterView,
    ChapterManage,
    MemberView,
    MemberManage,
    EventView,
    EventManage,
    RsvpSelf,
    FinanceView,
    FinanceManage,
    BillingManage,
    BroadcastSend,
    AuditView,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied { required: Permission },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Whether a role grants a permission.
pub fn role_allows(role: ChapterRole, permission: Permission) -> bool {
    match role {
        // Owners and admins hold every chapter permission.
        ChapterRole::Owner | ChapterRole::Admin => true,
        ChapterRole::Member => matches!(
            permission,
            Permission::ChapterView
                | Permission::MemberView
                | Permission::EventView
                | Permission::RsvpSelf
                | Permission::FinanceView
        ),
        // Pending members hold nothing until approved.
        ChapterRole::PendingMember => false,
    }
}

/// Check a (possibly absent) membership role against a required permission.
pub fn check(role: Option<ChapterRole>, required: Permission) -> AccessDecision {
    match role {
        Some(r) if role_allows(r, required) => AccessDecision::Allowed,
        _ => AccessDecision::Denied { required },
    }
}

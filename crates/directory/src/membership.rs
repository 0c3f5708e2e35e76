//! Chapter memberships: join requests, approval workflow, role changes,
//! and ownership transfer.
//!
//! Invariant: a chapter has exactly one `Owner` at all times.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::{ChapterRole, GreekDashError, GreekDashResult};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// The join entity granting a user a role within a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub user_id: Uuid,
    pub role: ChapterRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership store backed by DashMap.
pub struct MembershipStore {
    memberships: DashMap<Uuid, Membership>,
}

impl Default for MembershipStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipStore {
    pub fn new() -> Self {
        Self {
            memberships: DashMap::new(),
        }
    }

    /// Self-service join request (after a valid join code): creates a
    /// `PendingMember` awaiting admin approval.
    pub fn request_join(&self, chapter_id: Uuid, user_id: Uuid) -> GreekDashResult<Membership> {
        if self.find(chapter_id, user_id).is_some() {
            return Err(GreekDashError::Conflict(
                "user already has a membership in this chapter".into(),
            ));
        }
        let membership = self.insert(chapter_id, user_id, ChapterRole::PendingMember);
        info!(chapter_id = %chapter_id, user_id = %user_id, "Join requested");
        Ok(membership)
    }

    /// Directly add an active member (owner bootstrap, invite redemption).
    pub fn add_member(
        &self,
        chapter_id: Uuid,
        user_id: Uuid,
        role: ChapterRole,
    ) -> GreekDashResult<Membership> {
        if self.find(chapter_id, user_id).is_some() {
            return Err(GreekDashError::Conflict(
                "user already has a membership in this chapter".into(),
            ));
        }
        if role == ChapterRole::Owner && self.owner_of(chapter_id).is_some() {
            return Err(GreekDashError::Conflict("chapter already has an owner".into()));
        }
        let membership = self.insert(chapter_id, user_id, role);
        info!(chapter_id = %chapter_id, user_id = %user_id, role = %role, "Member added");
        Ok(membership)
    }

    /// Approve a pending join request, promoting it to `Member`.
    pub fn approve(&self, membership_id: Uuid) -> GreekDashResult<Membership> {
        let mut entry = self
            .memberships
            .get_mut(&membership_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("membership: {membership_id}")))?;
        if entry.role != ChapterRole::PendingMember {
            return Err(GreekDashError::Validation("membership is not pending".into()));
        }
        entry.role = ChapterRole::Member;
        entry.updated_at = Utc::now();
        info!(membership_id = %membership_id, "Join request approved");
        Ok(entry.clone())
    }

    /// Deny a pending join request, removing the membership.
    pub fn deny(&self, membership_id: Uuid) -> GreekDashResult<Membership> {
        let pending = self
            .get(membership_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("membership: {membership_id}")))?;
        if pending.role != ChapterRole::PendingMember {
            return Err(GreekDashError::Validation("membership is not pending".into()));
        }
        self.memberships.remove(&membership_id);
        info!(membership_id = %membership_id, "Join request denied");
        Ok(pending)
    }

    /// Change a member's role between `Member` and `Admin`.
    ///
    /// Ownership moves only through [`transfer_ownership`]; pending
    /// memberships change only through approve/deny.
    pub fn change_role(&self, membership_id: Uuid, role: ChapterRole) -> GreekDashResult<Membership> {
        if !matches!(role, ChapterRole::Member | ChapterRole::Admin) {
            return Err(GreekDashError::Validation(format!("cannot assign role: {role}")));
        }
        let mut entry = self
            .memberships
            .get_mut(&membership_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("membership: {membership_id}")))?;
        if entry.role == ChapterRole::Owner {
            return Err(GreekDashError::Validation(
                "ownership is changed via transfer, not role change".into(),
            ));
        }
        if entry.role == ChapterRole::PendingMember {
            return Err(GreekDashError::Validation("membership is still pending".into()));
        }
        entry.role = role;
        entry.updated_at = Utc::now();
        info!(membership_id = %membership_id, role = %role, "Role changed");
        Ok(entry.clone())
    }

    /// Transfer chapter ownership to another active membership. The current
    /// owner is demoted to `Admin`.
    pub fn transfer_ownership(
        &self,
        chapter_id: Uuid,
        new_owner_membership_id: Uuid,
    ) -> GreekDashResult<Membership> {
        let current_owner = self
            .owner_of(chapter_id)
            .ok_or_else(|| GreekDashError::NotFound("chapter has no owner".into()))?;

        {
            let target = self
                .memberships
                .get(&new_owner_membership_id)
                .ok_or_else(|| GreekDashError::NotFound(format!("membership: {new_owner_membership_id}")))?;
            if target.chapter_id != chapter_id {
                return Err(GreekDashError::Validation(
                    "membership belongs to a different chapter".into(),
                ));
            }
            if !target.role.is_active() {
                return Err(GreekDashError::Validation(
                    "cannot transfer ownership to a pending member".into(),
                ));
            }
            if target.id == current_owner.id {
                return Err(GreekDashError::Validation("user already owns this chapter".into()));
            }
        }

        let now = Utc::now();
        if let Some(mut old) = self.memberships.get_mut(&current_owner.id) {
            old.role = ChapterRole::Admin;
            old.updated_at = now;
        }
        let mut new_owner = self
            .memberships
            .get_mut(&new_owner_membership_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("membership: {new_owner_membership_id}")))?;
        new_owner.role = ChapterRole::Owner;
        new_owner.updated_at = now;
        info!(
            chapter_id = %chapter_id,
            new_owner = %new_owner.user_id,
            "Ownership transferred"
        );
        Ok(new_owner.clone())
    }

    /// Remove a membership. The owner cannot be removed.
    pub fn remove(&self, membership_id: Uuid) -> GreekDashResult<Membership> {
        let membership = self
            .get(membership_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("membership: {membership_id}")))?;
        if membership.role == ChapterRole::Owner {
            return Err(GreekDashError::Validation(
                "transfer ownership before removing the owner".into(),
            ));
        }
        self.memberships.remove(&membership_id);
        info!(membership_id = %membership_id, "Member removed");
        Ok(membership)
    }

    pub fn get(&self, id: Uuid) -> Option<Membership> {
        self.memberships.get(&id).map(|e| e.value().clone())
    }

    /// Find the membership a user holds in a chapter, if any.
    pub fn find(&self, chapter_id: Uuid, user_id: Uuid) -> Option<Membership> {
        self.memberships
            .iter()
            .find(|e| e.value().chapter_id == chapter_id && e.value().user_id == user_id)
            .map(|e| e.value().clone())
    }

    /// All memberships in a chapter, oldest first.
    pub fn list_for_chapter(&self, chapter_id: Uuid) -> Vec<Membership> {
        let mut members: Vec<Membership> = self
            .memberships
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        members
    }

    /// Pending join requests for a chapter.
    pub fn list_pending(&self, chapter_id: Uuid) -> Vec<Membership> {
        self.list_for_chapter(chapter_id)
            .into_iter()
            .filter(|m| m.role == ChapterRole::PendingMember)
            .collect()
    }

    /// All memberships a user holds across chapters.
    pub fn list_for_user(&self, user_id: Uuid) -> Vec<Membership> {
        self.memberships
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Count of active (approved) members in a chapter.
    pub fn active_member_count(&self, chapter_id: Uuid) -> u32 {
        self.memberships
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id && e.value().role.is_active())
            .count() as u32
    }

    fn owner_of(&self, chapter_id: Uuid) -> Option<Membership> {
        self.memberships
            .iter()
            .find(|e| e.value().chapter_id == chapter_id && e.value().role == ChapterRole::Owner)
            .map(|e| e.value().clone())
    }

    fn insert(&self, chapter_id: Uuid, user_id: Uuid, role: ChapterRole) -> Membership {
        let now = Utc::now();
        let membership = Membership {
            id: Uuid::new_v4(),
            chapter_id,
            user_id,
            role,
            created_at: now,
            updated_at: now,
        };
        self.memberships.insert(membership.id, membership.clone());
        membership
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_approve_flow() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();
        let user = Uuid::new_v4();

        let pending = store.request_join(chapter, user).unwrap();
        assert_eq!(pending.role, ChapterRole::PendingMember);
        assert_eq!(store.active_member_count(chapter), 0);

        // Duplicate request is rejected.
        assert!(matches!(
            store.request_join(chapter, user).unwrap_err(),
            GreekDashError::Conflict(_)
        ));

        let approved = store.approve(pending.id).unwrap();
        assert_eq!(approved.role, ChapterRole::Member);
        assert_eq!(store.active_member_count(chapter), 1);

        // Approving twice fails.
        assert!(store.approve(pending.id).is_err());
    }

    #[test]
    fn test_deny_removes_membership() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();
        let user = Uuid::new_v4();

        let pending = store.request_join(chapter, user).unwrap();
        store.deny(pending.id).unwrap();
        assert!(store.find(chapter, user).is_none());

        // The user may request again after a denial.
        assert!(store.request_join(chapter, user).is_ok());
    }

    #[test]
    fn test_single_owner_invariant() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();

        store.add_member(chapter, Uuid::new_v4(), ChapterRole::Owner).unwrap();
        let err = store
            .add_member(chapter, Uuid::new_v4(), ChapterRole::Owner)
            .unwrap_err();
        assert!(matches!(err, GreekDashError::Conflict(_)));
    }

    #[test]
    fn test_transfer_ownership() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();
        let owner_user = Uuid::new_v4();
        let admin_user = Uuid::new_v4();

        let owner = store.add_member(chapter, owner_user, ChapterRole::Owner).unwrap();
        let admin = store.add_member(chapter, admin_user, ChapterRole::Admin).unwrap();

        let new_owner = store.transfer_ownership(chapter, admin.id).unwrap();
        assert_eq!(new_owner.role, ChapterRole::Owner);
        assert_eq!(store.get(owner.id).unwrap().role, ChapterRole::Admin);

        // Pending members cannot receive ownership.
        let pending = store.request_join(chapter, Uuid::new_v4()).unwrap();
        assert!(store.transfer_ownership(chapter, pending.id).is_err());
    }

    #[test]
    fn test_role_change_rules() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();
        let owner = store.add_member(chapter, Uuid::new_v4(), ChapterRole::Owner).unwrap();
        let member = store.add_member(chapter, Uuid::new_v4(), ChapterRole::Member).unwrap();

        // Member -> Admin is fine.
        let promoted = store.change_role(member.id, ChapterRole::Admin).unwrap();
        assert_eq!(promoted.role, ChapterRole::Admin);

        // Owner role is off limits for change_role.
        assert!(store.change_role(owner.id, ChapterRole::Member).is_err());
        assert!(store.change_role(member.id, ChapterRole::Owner).is_err());
    }

    #[test]
    fn test_owner_cannot_be_removed() {
        let store = MembershipStore::new();
        let chapter = Uuid::new_v4();
        let owner = store.add_member(chapter, Uuid::new_v4(), ChapterRole::Owner).unwrap();
        let member = store.add_member(chapter, Uuid::new_v4(), ChapterRole::Member).unwrap();

        assert!(store.remove(owner.id).is_err());
        assert!(store.remove(member.id).is_ok());
        assert!(store.get(member.id).is_none());
    }
}

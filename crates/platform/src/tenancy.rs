//! Multi-tenancy: chapter lifecycle, slugs, join codes, and plan quotas.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::{GreekDashError, GreekDashResult, PlanTier};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Chapter lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Active,
    Suspended,
    Cancelled,
}

/// A single chapter (tenant) in the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: ChapterStatus,
    pub plan: PlanTier,
    /// Shared secret allowing self-service membership requests.
    pub join_code: String,
    /// Customer id at the billing provider, once one exists.
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Multi-tenant chapter registry backed by DashMap.
pub struct ChapterManager {
    chapters: DashMap<Uuid, Chapter>,
    /// slug -> chapter id, enforcing slug uniqueness.
    slug_index: DashMap<String, Uuid>,
}

impl Default for ChapterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChapterManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            chapters: DashMap::new(),
            slug_index: DashMap::new(),
        }
    }

    /// Create a new chapter on the free tier.
    ///
    /// When `slug` is given it must be unused; when omitted it is derived
    /// from the name and deduplicated with a numeric suffix.
    pub fn create_chapter(&self, name: &str, slug: Option<&str>) -> GreekDashResult<Chapter> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GreekDashError::Validation("chapter name must not be empty".into()));
        }

        let slug = match slug {
            Some(s) => {
                let s = validate_slug(s)?;
                if self.slug_index.contains_key(&s) {
                    return Err(GreekDashError::Conflict(format!("slug already taken: {s}")));
                }
                s
            }
            None => self.dedupe_slug(&derive_slug(name)),
        };

        let now = Utc::now();
        let chapter = Chapter {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.clone(),
            status: ChapterStatus::Active,
            plan: PlanTier::Free,
            join_code: generate_join_code(),
            billing_customer_id: None,
            created_at: now,
            updated_at: now,
        };

        info!(chapter_id = %chapter.id, slug = %chapter.slug, "Chapter created");
        self.slug_index.insert(slug, chapter.id);
        self.chapters.insert(chapter.id, chapter.clone());
        Ok(chapter)
    }

    /// Look up a chapter by id.
    pub fn get(&self, id: Uuid) -> Option<Chapter> {
        self.chapters.get(&id).map(|e| e.value().clone())
    }

    /// Look up a chapter by slug.
    pub fn get_by_slug(&self, slug: &str) -> Option<Chapter> {
        let id = *self.slug_index.get(slug)?.value();
        self.get(id)
    }

    /// List all chapters.
    pub fn list(&self) -> Vec<Chapter> {
        self.chapters.iter().map(|e| e.value().clone()).collect()
    }

    /// Rename a chapter. The slug is stable and does not change.
    pub fn rename(&self, id: Uuid, name: &str) -> Option<Chapter> {
        self.chapters.get_mut(&id).map(|mut entry| {
            entry.name = name.trim().to_string();
            entry.updated_at = Utc::now();
            entry.clone()
        })
    }

    /// Rotate the join code, invalidating the previous one.
    pub fn rotate_join_code(&self, id: Uuid) -> Option<String> {
        self.chapters.get_mut(&id).map(|mut entry| {
            entry.join_code = generate_join_code();
            entry.updated_at = Utc::now();
            info!(chapter_id = %id, "Join code rotated");
            entry.join_code.clone()
        })
    }

    /// Check a join code against an active chapter. Suspended and cancelled
    /// chapters reject joins.
    pub fn verify_join_code(&self, slug: &str, code: &str) -> GreekDashResult<Chapter> {
        let chapter = self
            .get_by_slug(slug)
            .ok_or_else(|| GreekDashError::NotFound(format!("chapter: {slug}")))?;
        if chapter.status != ChapterStatus::Active {
            return Err(GreekDashError::Forbidden("chapter is not active".into()));
        }
        if chapter.join_code != code.trim().to_uppercase() {
            return Err(GreekDashError::Forbidden("invalid join code".into()));
        }
        Ok(chapter)
    }

    /// Suspend a chapter.
    pub fn suspend(&self, id: Uuid) -> Option<Chapter> {
        self.set_status(id, ChapterStatus::Suspended)
    }

    /// Reactivate a suspended or cancelled chapter.
    pub fn reactivate(&self, id: Uuid) -> Option<Chapter> {
        self.set_status(id, ChapterStatus::Active)
    }

    fn set_status(&self, id: Uuid, status: ChapterStatus) -> Option<Chapter> {
        self.chapters.get_mut(&id).map(|mut entry| {
            entry.status = status;
            entry.updated_at = Utc::now();
            info!(chapter_id = %id, status = ?status, "Chapter status changed");
            entry.clone()
        })
    }

    /// Set the plan tier (driven by billing webhook processing).
    pub fn set_plan(&self, id: Uuid, plan: PlanTier) -> Option<Chapter> {
        self.chapters.get_mut(&id).map(|mut entry| {
            entry.plan = plan;
            entry.updated_at = Utc::now();
            info!(chapter_id = %id, plan = %plan, "Chapter plan changed");
            entry.clone()
        })
    }

    /// Record the billing provider customer id for a chapter.
    pub fn set_billing_customer(&self, id: Uuid, customer_id: &str) -> Option<()> {
        self.chapters.get_mut(&id).map(|mut entry| {
            entry.billing_customer_id = Some(customer_id.to_string());
            entry.updated_at = Utc::now();
        })
    }

    /// Find a chapter by its billing provider customer id.
    pub fn get_by_billing_customer(&self, customer_id: &str) -> Option<Chapter> {
        self.chapters
            .iter()
            .find(|e| e.value().billing_customer_id.as_deref() == Some(customer_id))
            .map(|e| e.value().clone())
    }

    /// Whether the chapter's plan admits another active member.
    pub fn within_member_quota(&self, id: Uuid, active_members: u32) -> GreekDashResult<bool> {
        let chapter = self
            .get(id)
            .ok_or_else(|| GreekDashError::NotFound(format!("chapter: {id}")))?;
        Ok(match chapter.plan.member_limit() {
            Some(limit) => active_members < limit,
            None => true,
        })
    }

    /// Append `-2`, `-3`, ... until the slug is free.
    fn dedupe_slug(&self, base: &str) -> String {
        if !self.slug_index.contains_key(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.slug_index.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Derive a URL-safe slug from a chapter name.
fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "chapter".to_string()
    } else {
        slug
    }
}

/// Validate an explicitly requested slug.
fn validate_slug(slug: &str) -> GreekDashResult<String> {
    let slug = slug.trim().to_lowercase();
    if slug.is_empty() || slug.len() > 64 {
        return Err(GreekDashError::Validation("slug must be 1-64 characters".into()));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(GreekDashError::Validation(
            "slug may contain only lowercase letters, digits, and dashes".into(),
        ));
    }
    Ok(slug)
}

/// Generate an 8-character uppercase alphanumeric join code.
fn generate_join_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

//! User registry with salted password hashing.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use greekdash_core::{GreekDashError, GreekDashResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

/// A registered user. The same user may belong to several chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory user store with an email uniqueness index.
pub struct UserDirectory {
    users: DashMap<Uuid, User>,
    email_index: DashMap<String, Uuid>,
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            email_index: DashMap::new(),
        }
    }

    /// Register a new user. Emails are unique, case-insensitive.
    pub fn register(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
        password: &str,
    ) -> GreekDashResult<User> {
        let email = normalize_email(email)?;
        if password.len() < 8 {
            return Err(GreekDashError::Validation(
                "password must be at least 8 characters".into(),
            ));
        }
        if self.email_index.contains_key(&email) {
            return Err(GreekDashError::Conflict(format!("email already registered: {email}")));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            name: name.trim().to_string(),
            phone: phone.map(|p| p.trim().to_string()),
            password_hash: hash_password(password),
            created_at: now,
            updated_at: now,
        };

        info!(user_id = %user.id, "User registered");
        self.email_index.insert(email, user.id);
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Verify credentials; returns the user on success.
    pub fn verify_password(&self, email: &str, password: &str) -> Option<User> {
        let email = normalize_email(email).ok()?;
        let id = *self.email_index.get(&email)?.value();
        let user = self.users.get(&id)?.clone();
        if verify_hash(&user.password_hash, password) {
            Some(user)
        } else {
            None
        }
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn get_by_email(&self, email: &str) -> Option<User> {
        let email = normalize_email(email).ok()?;
        let id = *self.email_index.get(&email)?.value();
        self.get(id)
    }

    /// Update display name and phone number.
    pub fn update_profile(&self, id: Uuid, name: Option<&str>, phone: Option<&str>) -> Option<User> {
        self.users.get_mut(&id).map(|mut entry| {
            if let Some(name) = name {
                entry.name = name.trim().to_string();
            }
            if let Some(phone) = phone {
                entry.phone = Some(phone.trim().to_string());
            }
            entry.updated_at = Utc::now();
            entry.clone()
        })
    }
}

fn normalize_email(email: &str) -> GreekDashResult<String> {
    let email = email.trim().to_lowercase();
    // Structural check only; deliverability is the provider's problem.
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !valid {
        return Err(GreekDashError::Validation(format!("invalid email: {email}")));
    }
    Ok(email)
}

/// Salted SHA-256 as `salt$digest` hex. Production: argon2id.
fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}${}", hex::encode(salt), digest)
}

fn verify_hash(stored: &str, password: &str) -> bool {
    let Some((salt_hex, digest)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    salted_digest(&salt, password) == digest
}

fn salted_digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_login() {
        let dir = UserDirectory::new();
        let user = dir
            .register("Jordan@Example.com", "Jordan Reyes", Some("+15551234567"), "hunter2hunter2")
            .unwrap();

        // Email is normalized.
        assert_eq!(user.email, "jordan@example.com");

        let verified = dir.verify_password("jordan@example.com", "hunter2hunter2").unwrap();
        assert_eq!(verified.id, user.id);

        assert!(dir.verify_password("jordan@example.com", "wrong-password").is_none());
        assert!(dir.verify_password("nobody@example.com", "hunter2hunter2").is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let dir = UserDirectory::new();
        dir.register("a@example.com", "A", None, "password1").unwrap();
        let err = dir.register("A@EXAMPLE.COM", "A2", None, "password2").unwrap_err();
        assert!(matches!(err, GreekDashError::Conflict(_)));
    }

    #[test]
    fn test_validation() {
        let dir = UserDirectory::new();
        assert!(dir.register("not-an-email", "X", None, "password1").is_err());
        assert!(dir.register("x@example.com", "X", None, "short").is_err());
    }

    #[test]
    fn test_update_profile() {
        let dir = UserDirectory::new();
        let user = dir.register("b@example.com", "Before", None, "password1").unwrap();
        let updated = dir
            .update_profile(user.id, Some("After"), Some("+15550001111"))
            .unwrap();
        assert_eq!(updated.name, "After");
        assert_eq!(updated.phone.as_deref(), Some("+15550001111"));
    }
}

//! SaaS platform capabilities: multi-tenancy (chapters), authentication
//! sessions, role-based access checks, and audit logging.

pub mod audit;
pub mod auth;
pub mod rbac;
pub mod tenancy;

pub use audit::AuditLogger;
pub use auth::AuthManager;
pub use rbac::{AccessDecision, Permission};
pub use tenancy::ChapterManager;

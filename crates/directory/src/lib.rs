//! User directory, chapter memberships, and invites.
//!
//! Covers the join-code request flow, admin approval workflow, role
//! management with the single-owner invariant, and expiring invite tokens.
//! Data stored in DashMap (development); swap to PostgreSQL for production.

pub mod invites;
pub mod membership;
pub mod users;

pub use invites::InviteManager;
pub use membership::MembershipStore;
pub use users::UserDirectory;

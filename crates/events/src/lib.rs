//! Chapter events and RSVPs.
//!
//! Data stored in DashMap (development); swap to PostgreSQL for production.

pub mod models;
pub mod store;

pub use models::{Event, EventRsvp, RsvpStatus};
pub use store::EventStore;

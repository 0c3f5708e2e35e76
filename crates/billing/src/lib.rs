//! Billing: plan catalog, local subscription mirror, checkout/portal
//! session creation, and webhook event mapping.
//!
//! The payment provider owns the subscription state machine; this crate
//! mirrors provider events into local records. Data stored in DashMap
//! (development); swap to PostgreSQL for production.

pub mod billing;
pub mod checkout;
pub mod webhook;

pub use billing::BillingEngine;
pub use checkout::CheckoutService;
pub use webhook::{WebhookOutcome, WebhookProcessor};

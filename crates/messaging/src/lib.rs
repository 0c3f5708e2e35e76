//! Outbound messaging: email and SMS providers plus broadcast fan-out.
//!
//! Providers construct real request payloads but stub the HTTP call;
//! swap in the live provider clients for production.

pub mod broadcast;
pub mod email;
pub mod sms;

pub use broadcast::Broadcaster;
pub use email::ResendProvider;
pub use sms::TwilioSmsProvider;

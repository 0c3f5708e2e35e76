//! REST API server: tenant-scoped routers, bearer-token auth middleware,
//! health probes, and the Prometheus metrics exporter.

pub mod auth;
pub mod auth_rest;
pub mod billing_rest;
pub mod broadcast_rest;
pub mod chapter_rest;
pub mod event_rest;
pub mod finance_rest;
pub mod rest;
pub mod server;
pub mod state;

pub use server::{build_router, ApiServer};
pub use state::ApiContext;

//! HTTP API surface
//!
//! OpenAI-compatible inference endpoints plus the admin surface for service
//! lifecycle, settings and catalog management.

pub mod routes;
pub mod server;
pub mod types;

pub use server::{AppState, GatewayApiServer, HttpApiConfig};

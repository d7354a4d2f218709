//! HTTP server for the school portal account service.
//!
//! Exposes registration, login and account management over a JSON API
//! built on axum. Routes are served at the root and mirrored under
//! `/api/v1`.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

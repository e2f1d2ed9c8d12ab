//! Auth Service Library
//!
//! Multi-tenant credential and session lifecycle engine. Exposes core modules
//! for use by binaries and tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod middleware;
pub mod store;

pub use auth::AuthEngine;
pub use config::AuthConfig;

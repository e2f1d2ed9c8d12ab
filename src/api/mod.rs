//! HTTP transport adapter over the session engine.

pub mod routes;

pub use routes::{create_router, AppState};

//! Authentication Module
//! Mission: Tenant-scoped registration, login and session lifecycle

pub mod engine;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod password;
pub mod sweeper;

pub use engine::AuthEngine;
pub use errors::{AuthError, ErrorKind};
pub use jwt::{TokenCodec, TokenError};
pub use password::PasswordHasher;
pub use sweeper::{SessionSweeper, SweeperHandle};

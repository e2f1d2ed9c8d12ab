//! Credential Store
//! Mission: The only component that touches persistent state. Users, clients
//! and sessions behind one injectable trait.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::models::{Client, Session, User};

pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("store deadline exceeded")]
    Timeout,

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable mapping of clients, users and sessions.
///
/// Session reads only ever return rows whose `expires_at` is in the future.
/// At most one session exists per (user, client) pair and refresh values are
/// unique across all sessions. Callers bound each call with a deadline; a
/// dropped future must leave the store consistent.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_client(&self, client: &Client) -> StoreResult<()>;
    async fn client_by_id(&self, client_id: &str) -> StoreResult<Client>;
    async fn client_exists(&self, client_id: &str) -> StoreResult<bool>;

    /// `AlreadyExists` if the id or the (client, email) pair is taken.
    async fn create_user(&self, user: &User) -> StoreResult<()>;
    async fn user_by_email(&self, client_id: &str, email: &str) -> StoreResult<User>;
    async fn user_by_id(&self, user_id: &str) -> StoreResult<User>;
    /// Whole-record replace keyed by `user_id`.
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    /// Set a new password hash and drop every session of the user in one
    /// atomic step. Returns the number of sessions removed.
    async fn replace_password(
        &self,
        user_id: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64>;
    /// Removes the user and every session it owns.
    async fn delete_user(&self, user_id: &str) -> StoreResult<()>;
    async fn email_registered(&self, client_id: &str, email: &str) -> StoreResult<bool>;

    /// Insert-or-replace keyed by (user, client) as one atomic write.
    async fn upsert_session(&self, session: &Session) -> StoreResult<()>;
    /// Replace the live session holding `old_refresh` with `next`, atomically.
    /// `NotFound` if `old_refresh` is unknown, expired or already rotated.
    async fn rotate_session(&self, old_refresh: &str, next: &Session) -> StoreResult<()>;
    async fn session_for(&self, user_id: &str, client_id: &str) -> StoreResult<Session>;
    async fn session_by_refresh(&self, refresh_token: &str) -> StoreResult<Session>;
    async fn delete_session_by_refresh(&self, refresh_token: &str) -> StoreResult<()>;
    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64>;
    async fn delete_expired_sessions(&self) -> StoreResult<u64>;
}

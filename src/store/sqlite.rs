//! Credential Storage
//! Mission: Persist clients, users and sessions in SQLite with the
//! uniqueness and cascade rules enforced by the schema itself

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

use super::{CredentialStore, StoreError, StoreResult};
use crate::auth::models::{Client, Session, User};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    client_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    secret_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    client_id TEXT NOT NULL
        REFERENCES clients(client_id) ON UPDATE CASCADE ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (client_id, email)
);

CREATE INDEX IF NOT EXISTS idx_users_client ON users(client_id);

-- One row per (user, client): the single-active-session policy lives in the key
CREATE TABLE IF NOT EXISTS sessions (
    user_id TEXT NOT NULL
        REFERENCES users(user_id) ON UPDATE CASCADE ON DELETE CASCADE,
    client_id TEXT NOT NULL
        REFERENCES clients(client_id) ON UPDATE CASCADE ON DELETE CASCADE,
    refresh_token TEXT NOT NULL UNIQUE,
    user_agent TEXT NOT NULL DEFAULT '',
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, client_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
"#;

const USER_COLUMNS: &str =
    "user_id, username, email, password_hash, client_id, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "user_id, client_id, refresh_token, user_agent, expires_at, created_at, updated_at";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == ErrorCode::ConstraintViolation
                    && f.extended_code != ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                StoreError::AlreadyExists
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

fn millis_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        client_id: row.get(0)?,
        name: row.get(1)?,
        secret_hash: row.get(2)?,
        created_at: millis_to_utc(3, row.get(3)?)?,
        updated_at: millis_to_utc(4, row.get(4)?)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        client_id: row.get(4)?,
        created_at: millis_to_utc(5, row.get(5)?)?,
        updated_at: millis_to_utc(6, row.get(6)?)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        user_id: row.get(0)?,
        client_id: row.get(1)?,
        refresh_token: row.get(2)?,
        user_agent: row.get(3)?,
        expires_at: millis_to_utc(4, row.get(4)?)?,
        created_at: millis_to_utc(5, row.get(5)?)?,
        updated_at: millis_to_utc(6, row.get(6)?)?,
    })
}

/// SQLite-backed credential store
#[derive(Clone)]
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).with_context(|| {
            format!("Failed to open credential store at {}", db_path.display())
        })?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        let store = Self::init(conn)?;
        info!("🔐 Credential store ready at {}", db_path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply credential store schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn create_client(&self, client: &Client) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO clients (client_id, name, secret_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                client.client_id,
                client.name,
                client.secret_hash,
                client.created_at.timestamp_millis(),
                client.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn client_by_id(&self, client_id: &str) -> StoreResult<Client> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT client_id, name, secret_hash, created_at, updated_at
             FROM clients WHERE client_id = ?1",
        )?;
        Ok(stmt.query_row(params![client_id], client_from_row)?)
    }

    async fn client_exists(&self, client_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM clients WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                user.user_id,
                user.username,
                user.email,
                user.password_hash,
                user.client_id,
                user.created_at.timestamp_millis(),
                user.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn user_by_email(&self, client_id: &str, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE client_id = ?1 AND email = ?2"
        ))?;
        Ok(stmt.query_row(params![client_id, email], user_from_row)?)
    }

    async fn user_by_id(&self, user_id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"))?;
        Ok(stmt.query_row(params![user_id], user_from_row)?)
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE users
             SET username = ?2, email = ?3, password_hash = ?4, client_id = ?5,
                 created_at = ?6, updated_at = ?7
             WHERE user_id = ?1",
            params![
                user.user_id,
                user.username,
                user.email,
                user.password_hash,
                user.client_id,
                user.created_at.timestamp_millis(),
                user.updated_at.timestamp_millis(),
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn replace_password(
        &self,
        user_id: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, password_hash, updated_at.timestamp_millis()],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        let revoked = tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        tx.commit()?;
        Ok(revoked as u64)
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        info!("🗑️  Deleted user: {}", user_id);
        Ok(())
    }

    async fn email_registered(&self, client_id: &str, email: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE client_id = ?1 AND email = ?2",
            params![client_id, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn upsert_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id, client_id) DO UPDATE SET
                     refresh_token = excluded.refresh_token,
                     user_agent = excluded.user_agent,
                     expires_at = excluded.expires_at,
                     updated_at = excluded.updated_at"
            ),
            params![
                session.user_id,
                session.client_id,
                session.refresh_token,
                session.user_agent,
                session.expires_at.timestamp_millis(),
                session.created_at.timestamp_millis(),
                session.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn rotate_session(&self, old_refresh: &str, next: &Session) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE sessions
             SET refresh_token = ?1, user_agent = ?2, expires_at = ?3, updated_at = ?4
             WHERE refresh_token = ?5 AND expires_at > ?6 AND user_id = ?7 AND client_id = ?8",
            params![
                next.refresh_token,
                next.user_agent,
                next.expires_at.timestamp_millis(),
                next.updated_at.timestamp_millis(),
                old_refresh,
                Utc::now().timestamp_millis(),
                next.user_id,
                next.client_id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn session_for(&self, user_id: &str, client_id: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = ?1 AND client_id = ?2 AND expires_at > ?3"
        ))?;
        stmt.query_row(
            params![user_id, client_id, Utc::now().timestamp_millis()],
            session_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    async fn session_by_refresh(&self, refresh_token: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE refresh_token = ?1 AND expires_at > ?2"
        ))?;
        stmt.query_row(
            params![refresh_token, Utc::now().timestamp_millis()],
            session_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_session_by_refresh(&self, refresh_token: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE refresh_token = ?1",
            params![refresh_token],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let rows = conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(rows as u64)
    }

    async fn delete_expired_sessions(&self) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        Ok(rows as u64)
    }
}

//! Session Lifecycle Engine
//! Mission: Login, validation, rotation and revocation of tenant-scoped
//! credential pairs. Stateless between calls; the store holds everything.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use std::{
    fmt::Display,
    future::Future,
    sync::{Arc, OnceLock},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{
    errors::AuthError,
    jwt::{refresh_binding, TokenCodec, TokenError},
    models::{
        AccessClaims, ChangePasswordRequest, Client, HealthResponse, LoginRequest, LoginResponse,
        LogoutRequest, ProfileResponse, RefreshRequest, RefreshResponse, RegisterClientResponse,
        RegisterRequest, RegisterResponse, Session, StatusResponse, TokenRequest, User,
        UserProfile, ValidateResponse,
    },
    password::PasswordHasher,
};
use crate::config::AuthConfig;
use crate::store::{CredentialStore, StoreError, StoreResult};

const DEFAULT_SESSION_TTL_DAYS: i64 = 7;
const DEFAULT_STORE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const MIN_PASSWORD_CHARS: usize = 8;
// bcrypt ignores everything past 72 bytes
const MAX_PASSWORD_BYTES: usize = 72;
const MAX_USERNAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 255;
const MAX_CLIENT_NAME_CHARS: usize = 100;
const MAX_USER_AGENT_CHARS: usize = 500;

const REFRESH_TOKEN_BYTES: usize = 32;
const CLIENT_SECRET_BYTES: usize = 32;

/// Random, URL-safe refresh value (256 bits).
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_client_secret() -> String {
    let mut bytes = [0u8; CLIENT_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

fn check_password_shape(password: &str, field: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::validation(format!(
            "{field} must be at least {MIN_PASSWORD_CHARS} characters long"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::validation(format!(
            "{field} must be at most {MAX_PASSWORD_BYTES} bytes long"
        )));
    }
    Ok(())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Log the cause, hand the caller nothing but `Internal`.
fn internal(op: &'static str, cause: impl Display) -> AuthError {
    error!(op, "{}", cause);
    AuthError::Internal
}

/// Orchestrates the credential lifecycle over an injected store.
pub struct AuthEngine {
    store: Arc<dyn CredentialStore>,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    session_ttl: Duration,
    store_timeout: std::time::Duration,
}

impl AuthEngine {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenCodec, hasher: PasswordHasher) -> Self {
        Self {
            store,
            tokens,
            hasher,
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn from_config(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> Self {
        let tokens = TokenCodec::with_ttl(&config.jwt_secret, config.access_token_ttl);
        Self::new(store, tokens, PasswordHasher::new(config.bcrypt_cost))
            .with_session_ttl(config.session_ttl)
            .with_store_timeout(config.store_timeout)
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "serving",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────

    pub async fn register(&self, req: &RegisterRequest) -> RegisterResponse {
        match self.try_register(req).await {
            Ok(user_id) => {
                info!("✅ User registered: {} (client {})", user_id, req.client_id);
                RegisterResponse {
                    success: true,
                    message: "User registered successfully".to_string(),
                    error: None,
                    user_id: Some(user_id),
                }
            }
            Err(err) => {
                debug!(client_id = %req.client_id, "registration rejected: {}", err);
                RegisterResponse::failure(&err)
            }
        }
    }

    pub async fn login(&self, req: &LoginRequest) -> LoginResponse {
        info!("🔐 Login attempt for client {}", req.client_id);
        match self.try_login(req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(client_id = %req.client_id, "❌ Failed login attempt: {}", err);
                LoginResponse::failure(&err)
            }
        }
    }

    pub async fn validate(&self, req: &TokenRequest) -> ValidateResponse {
        match self.authenticate_access(&req.access_token, true).await {
            Ok((user, claims)) => ValidateResponse {
                valid: true,
                message: "Token is valid".to_string(),
                error: None,
                user_id: Some(user.user_id),
                expires_at: claims.expires_at(),
            },
            Err(err) => ValidateResponse::failure(&err),
        }
    }

    pub async fn refresh(&self, req: &RefreshRequest) -> RefreshResponse {
        match self.try_refresh(req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(client_id = %req.client_id, "Token refresh rejected: {}", err);
                RefreshResponse::failure(&err)
            }
        }
    }

    pub async fn logout(&self, req: &LogoutRequest) -> StatusResponse {
        match self.try_logout(req).await {
            Ok(()) => {
                info!("👋 User logged out");
                StatusResponse::ok("Logged out successfully")
            }
            Err(err) => StatusResponse::failure(&err),
        }
    }

    pub async fn change_password(&self, req: &ChangePasswordRequest) -> StatusResponse {
        match self.try_change_password(req).await {
            Ok(user_id) => {
                info!("🔑 Password changed for user {}, all sessions revoked", user_id);
                StatusResponse::ok("Password changed successfully. Please log in again.")
            }
            Err(err) => {
                warn!("Password change rejected: {}", err);
                StatusResponse::failure(&err)
            }
        }
    }

    pub async fn user_profile(&self, req: &TokenRequest) -> ProfileResponse {
        match self.authenticate_access(&req.access_token, true).await {
            Ok((user, _)) => ProfileResponse {
                success: true,
                message: "User profile retrieved successfully".to_string(),
                error: None,
                user: Some(UserProfile::from_user(&user)),
            },
            Err(err) => ProfileResponse::failure(&err),
        }
    }

    /// Administrative: create a tenant. The secret is returned only here.
    pub async fn register_client(&self, name: &str) -> RegisterClientResponse {
        match self.try_register_client(name).await {
            Ok((client_id, client_secret)) => {
                info!("✅ Client registered: {} ({})", client_id, name.trim());
                RegisterClientResponse {
                    success: true,
                    message: "Client registered successfully".to_string(),
                    error: None,
                    client_id: Some(client_id),
                    client_secret: Some(client_secret),
                }
            }
            Err(err) => RegisterClientResponse::failure(&err),
        }
    }

    /// Check a (client id, secret) pair. Fails closed on any error.
    pub async fn authenticate_client(&self, client_id: &str, client_secret: &str) -> bool {
        if client_id.is_empty() || client_secret.is_empty() {
            return false;
        }
        match self
            .within("client_by_id", self.store.client_by_id(client_id))
            .await
        {
            Ok(client) => self.verify_password(client_secret, &client.secret_hash).await,
            Err(StoreError::NotFound) => {
                self.burn(client_secret).await;
                false
            }
            Err(e) => {
                internal("client_by_id", e);
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flows
    // ─────────────────────────────────────────────────────────────────────

    async fn try_register(&self, req: &RegisterRequest) -> Result<String, AuthError> {
        let username = req.username.trim();
        let email = normalize_email(&req.email);

        if username.is_empty() {
            return Err(AuthError::validation("username is required"));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AuthError::validation(format!(
                "username must be at most {MAX_USERNAME_CHARS} characters long"
            )));
        }
        if email.is_empty() {
            return Err(AuthError::validation("email is required"));
        }
        if email.chars().count() > MAX_EMAIL_CHARS || !is_valid_email(&email) {
            return Err(AuthError::validation("invalid email format"));
        }
        if req.password.is_empty() {
            return Err(AuthError::validation("password is required"));
        }
        check_password_shape(&req.password, "password")?;
        if req.client_id.is_empty() {
            return Err(AuthError::validation("client ID is required"));
        }

        self.require_client(&req.client_id).await?;

        let taken = self
            .within("email_registered", self.store.email_registered(&req.client_id, &email))
            .await
            .map_err(|e| internal("email_registered", e))?;
        if taken {
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = self.hash_password(&req.password).await?;
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email,
            password_hash,
            client_id: req.client_id.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.within("create_user", self.store.create_user(&user)).await {
            Ok(()) => Ok(user.user_id),
            // Lost a race with a concurrent registration of the same email
            Err(StoreError::AlreadyExists) => Err(AuthError::AlreadyExists),
            Err(e) => Err(internal("create_user", e)),
        }
    }

    async fn try_login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() || req.client_id.is_empty() {
            return Err(AuthError::validation(
                "Email, password, and client ID are required",
            ));
        }

        self.require_client(&req.client_id).await?;

        let user = match self
            .within("user_by_email", self.store.user_by_email(&req.client_id, &email))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                self.burn(&req.password).await;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(internal("user_by_email", e)),
        };

        // Never reveal that the email exists under another tenant
        if user.client_id != req.client_id {
            self.burn(&req.password).await;
            return Err(AuthError::InvalidCredentials);
        }

        if !self.verify_password(&req.password, &user.password_hash).await {
            return Err(AuthError::InvalidCredentials);
        }

        let refresh_token = generate_refresh_token();
        let (access_token, expires_at) = self.issue_access(&user, &refresh_token)?;

        let now = Utc::now();
        let session_expires_at = self.session_expiry(now)?;
        let session = Session {
            user_id: user.user_id.clone(),
            client_id: user.client_id.clone(),
            refresh_token: refresh_token.clone(),
            user_agent: truncate_chars(
                req.user_agent.as_deref().unwrap_or_default(),
                MAX_USER_AGENT_CHARS,
            ),
            expires_at: session_expires_at,
            created_at: now,
            updated_at: now,
        };
        self.within("upsert_session", self.store.upsert_session(&session))
            .await
            .map_err(|e| internal("upsert_session", e))?;

        info!("✅ Login successful: {} (client {})", user.user_id, user.client_id);

        Ok(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            error: None,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
            user: Some(UserProfile::from_user(&user)),
        })
    }

    async fn try_refresh(&self, req: &RefreshRequest) -> Result<RefreshResponse, AuthError> {
        if req.refresh_token.is_empty() || req.client_id.is_empty() {
            return Err(AuthError::validation(
                "Refresh token and client ID are required",
            ));
        }

        let session = match self
            .within("session_by_refresh", self.store.session_by_refresh(&req.refresh_token))
            .await
        {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidToken),
            Err(e) => return Err(internal("session_by_refresh", e)),
        };

        if session.client_id != req.client_id {
            return Err(AuthError::InvalidClient);
        }

        let user = self.load_user(&session.user_id).await?;

        let refresh_token = generate_refresh_token();
        let (access_token, expires_at) = self.issue_access(&user, &refresh_token)?;

        let now = Utc::now();
        let next = Session {
            refresh_token: refresh_token.clone(),
            expires_at: self.session_expiry(now)?,
            updated_at: now,
            ..session
        };

        match self
            .within("rotate_session", self.store.rotate_session(&req.refresh_token, &next))
            .await
        {
            Ok(()) => {}
            // Someone else rotated, logged out or swept it in between
            Err(StoreError::NotFound) => return Err(AuthError::InvalidToken),
            Err(e) => return Err(internal("rotate_session", e)),
        }

        info!("🔄 Token refreshed for user {}", user.user_id);

        Ok(RefreshResponse {
            success: true,
            message: "Token refreshed successfully".to_string(),
            error: None,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
        })
    }

    async fn try_logout(&self, req: &LogoutRequest) -> Result<(), AuthError> {
        if req.refresh_token.is_empty() {
            return Err(AuthError::validation("Refresh token is required"));
        }
        match self
            .within(
                "delete_session_by_refresh",
                self.store.delete_session_by_refresh(&req.refresh_token),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AuthError::InvalidToken),
            Err(e) => Err(internal("delete_session_by_refresh", e)),
        }
    }

    async fn try_change_password(&self, req: &ChangePasswordRequest) -> Result<String, AuthError> {
        if req.access_token.is_empty()
            || req.current_password.is_empty()
            || req.new_password.is_empty()
        {
            return Err(AuthError::validation(
                "Access token, current password, and new password are required",
            ));
        }
        check_password_shape(&req.new_password, "new password")?;

        let (user, _) = self.authenticate_access(&req.access_token, false).await?;

        if !self
            .verify_password(&req.current_password, &user.password_hash)
            .await
        {
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hash_password(&req.new_password).await?;
        let revoked = match self
            .within(
                "replace_password",
                self.store
                    .replace_password(&user.user_id, &password_hash, Utc::now()),
            )
            .await
        {
            Ok(revoked) => revoked,
            Err(StoreError::Timeout) => {
                // The write may still land after the deadline
                error!(
                    user_id = %user.user_id,
                    "password change outcome unknown after store deadline"
                );
                return Err(AuthError::Internal);
            }
            Err(e) => return Err(internal("replace_password", e)),
        };
        debug!(user_id = %user.user_id, revoked, "sessions revoked after password change");

        Ok(user.user_id)
    }

    async fn try_register_client(&self, name: &str) -> Result<(String, String), AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::validation("Client name is required"));
        }
        if name.chars().count() > MAX_CLIENT_NAME_CHARS {
            return Err(AuthError::validation(format!(
                "Client name must be at most {MAX_CLIENT_NAME_CHARS} characters long"
            )));
        }

        let client_secret = generate_client_secret();
        let now = Utc::now();
        let client = Client {
            client_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            secret_hash: self.hash_password(&client_secret).await?,
            created_at: now,
            updated_at: now,
        };

        self.within("create_client", self.store.create_client(&client))
            .await
            .map_err(|e| internal("create_client", e))?;

        Ok((client.client_id, client_secret))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shared steps
    // ─────────────────────────────────────────────────────────────────────

    /// Decode an access credential and re-check it against current state.
    ///
    /// Username and client must still match the user record. With
    /// `bind_session`, the live session's refresh value must be the one the
    /// credential was issued against.
    async fn authenticate_access(
        &self,
        token: &str,
        bind_session: bool,
    ) -> Result<(User, AccessClaims), AuthError> {
        if token.is_empty() {
            return Err(AuthError::validation("Access token is required"));
        }

        let claims = self.tokens.decode(token).map_err(|e| {
            match e {
                TokenError::Expired => debug!("access token expired"),
                _ => debug!("access token rejected: {}", e),
            }
            AuthError::Invalid
        })?;

        let user = self.load_user(&claims.sub).await?;

        if user.username != claims.username || user.client_id != claims.client_id {
            warn!(user_id = %user.user_id, "Token claims no longer match user record");
            return Err(AuthError::Invalid);
        }

        if bind_session {
            let session = match self
                .within(
                    "session_for",
                    self.store.session_for(&user.user_id, &user.client_id),
                )
                .await
            {
                Ok(session) => session,
                Err(StoreError::NotFound) => {
                    debug!(user_id = %user.user_id, "no live session for token");
                    return Err(AuthError::Invalid);
                }
                Err(e) => return Err(internal("session_for", e)),
            };
            if refresh_binding(&session.refresh_token) != claims.rtb {
                debug!(user_id = %user.user_id, "token bound to a superseded session");
                return Err(AuthError::Invalid);
            }
        }

        Ok((user, claims))
    }

    async fn require_client(&self, client_id: &str) -> Result<(), AuthError> {
        let exists = self
            .within("client_exists", self.store.client_exists(client_id))
            .await
            .map_err(|e| internal("client_exists", e))?;
        if !exists {
            return Err(AuthError::InvalidClient);
        }
        Ok(())
    }

    async fn load_user(&self, user_id: &str) -> Result<User, AuthError> {
        match self.within("user_by_id", self.store.user_by_id(user_id)).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AuthError::NotFound),
            Err(e) => Err(internal("user_by_id", e)),
        }
    }

    fn session_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        now.checked_add_signed(self.session_ttl).ok_or_else(|| {
            internal(
                "session_expiry",
                format!("session lifetime {} overflows the clock", self.session_ttl),
            )
        })
    }

    fn issue_access(&self, user: &User, refresh_token: &str) -> Result<(String, DateTime<Utc>), AuthError> {
        self.tokens
            .issue(&user.user_id, &user.username, &user.client_id, refresh_token)
            .map_err(|e| internal("issue_access", e))
    }

    /// Run one store call under the engine's deadline.
    async fn within<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, "store call exceeded {:?} deadline", self.store_timeout);
                Err(StoreError::Timeout)
            }
        }
    }

    async fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        let hasher = self.hasher;
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| internal("hash_password", e))?
            .map_err(|e| internal("hash_password", format!("{e:#}")))
    }

    async fn verify_password(&self, plaintext: &str, hash_value: &str) -> bool {
        let hasher = self.hasher;
        let plaintext = plaintext.to_string();
        let hash_value = hash_value.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash_value))
            .await
            .unwrap_or(false)
    }

    async fn burn(&self, plaintext: &str) {
        let hasher = self.hasher;
        let plaintext = plaintext.to_string();
        let _ = tokio::task::spawn_blocking(move || hasher.burn(&plaintext)).await;
    }
}

//! Authentication Models
//! Mission: Define tenant-scoped user, client and session records plus the
//! request/result values exchanged with the session engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::errors::{AuthError, ErrorKind};

/// A tenant application. Read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub secret_hash: String, // bcrypt hash - never serialize
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User account, scoped to exactly one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The live refresh value for one (user, client) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Public user profile (sanitized)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            client_id: user.client_id.clone(),
            created_at: user.created_at,
        }
    }
}

/// Access credential claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // subject (user_id)
    pub username: String,
    pub client_id: String,
    /// SHA-256 fingerprint of the refresh value active at issuance.
    pub rtb: String,
    pub iat: i64,
    pub exp: i64, // expiration timestamp
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
//
// Every result carries a success flag, a caller-safe message and, on failure,
// the error kind. Errors never cross this boundary any other way.
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RegisterResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl LoginResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            user: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidateResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            valid: false,
            message: err.to_string(),
            error: Some(err.kind()),
            user_id: None,
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            access_token: None,
            refresh_token: None,
            expires_at: None,
        }
    }
}

/// Result of operations that carry no payload (logout, change password).
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl StatusResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            error: None,
        }
    }

    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl ProfileResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            user: None,
        }
    }
}

/// Client credentials, shown once at registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterClientResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>, // Only shown once during creation
}

impl RegisterClientResponse {
    pub fn failure(err: &AuthError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            client_id: None,
            client_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        User {
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            client_id: "c1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$2b$04$hash"));
    }

    #[test]
    fn test_profile_from_user() {
        let user = sample_user();
        let profile = UserProfile::from_user(&user);
        assert_eq!(profile.user_id, "u-1");
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.client_id, "c1");
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_session_liveness() {
        let now = Utc::now();
        let session = Session {
            user_id: "u-1".to_string(),
            client_id: "c1".to_string(),
            refresh_token: "r".to_string(),
            user_agent: String::new(),
            expires_at: now + Duration::seconds(5),
            created_at: now,
            updated_at: now,
        };
        assert!(session.is_live_at(now));
        assert!(!session.is_live_at(now + Duration::seconds(5)));
    }

    #[test]
    fn test_failure_carries_kind_and_generic_message() {
        let resp = LoginResponse::failure(&AuthError::InvalidCredentials);
        assert!(!resp.success);
        assert_eq!(resp.error, Some(ErrorKind::InvalidCredentials));
        assert_eq!(resp.message, "Invalid credentials");

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"], "invalid_credentials");
        assert!(json.get("access_token").is_none());
    }

    #[test]
    fn test_missing_request_fields_default_to_empty() {
        let req: LoginRequest = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        assert_eq!(req.email, "a@b.co");
        assert!(req.password.is_empty());
        assert!(req.user_agent.is_none());
    }
}

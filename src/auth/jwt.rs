//! Access Token Codec
//! Mission: Issue and verify signed, time-bounded access credentials bound to
//! a refresh value

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::auth::models::AccessClaims;

const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, malformed structure or missing claims.
    #[error("token invalid")]
    Invalid,

    /// Signature verified but `exp` has passed.
    #[error("token expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Fingerprint of a refresh value as embedded in access claims.
pub fn refresh_binding(refresh_token: &str) -> String {
    hex::encode(Sha256::digest(refresh_token.as_bytes()))
}

/// HS256 codec holding the process-wide signing secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    /// Create a codec with the default 24 hour validity window
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::hours(DEFAULT_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a credential for `user_id` bound to `refresh_token`.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Signing("invalid expiry timestamp".to_string()))?;

        let claims = AccessClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            client_id: client_id.to_string(),
            rtb: refresh_binding(refresh_token),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        debug!(user_id, client_id, "Issuing access token, expires at {}", expires_at);

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        // exp is second-granular; report what the token actually carries
        let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at);
        Ok((token, expires_at))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let decoded = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        let claims = decoded.claims;
        if claims.sub.is_empty() || claims.client_id.is_empty() || claims.rtb.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    const SECRET: &str = "test-secret-key-12345";

    #[test]
    fn test_issue_and_decode() {
        let codec = TokenCodec::new(SECRET);

        let (token, expires_at) = codec.issue("user-1", "alice", "c1", "refresh-1").unwrap();
        assert!(!token.is_empty());
        assert!(expires_at > Utc::now() + Duration::hours(23));

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.client_id, "c1");
        assert_eq!(claims.rtb, refresh_binding("refresh-1"));
        assert_eq!(claims.expires_at(), Some(expires_at));
    }

    #[test]
    fn test_refresh_value_not_disclosed() {
        let codec = TokenCodec::new(SECRET);
        let (token, _) = codec.issue("user-1", "alice", "c1", "very-secret-refresh").unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert!(!json.contains("very-secret-refresh"));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let codec = TokenCodec::new(SECRET);
        assert_eq!(codec.decode("invalid.token.here"), Err(TokenError::Invalid));
        assert_eq!(codec.decode(""), Err(TokenError::Invalid));
    }

    #[test]
    fn test_different_secrets_reject() {
        let codec1 = TokenCodec::new("secret1");
        let codec2 = TokenCodec::new("secret2");

        let (token, _) = codec1.issue("user-1", "alice", "c1", "r").unwrap();
        assert_eq!(codec2.decode(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = TokenCodec::new(SECRET);
        let (token_a, _) = codec.issue("user-a", "alice", "c1", "r1").unwrap();
        let (token_b, _) = codec.issue("user-b", "bob", "c1", "r2").unwrap();

        // Splice b's claims under a's signature
        let a: Vec<&str> = token_a.split('.').collect();
        let b: Vec<&str> = token_b.split('.').collect();
        let forged = format!("{}.{}.{}", a[0], b[1], a[2]);
        assert_eq!(codec.decode(&forged), Err(TokenError::Invalid));

        let truncated = &token_a[..token_a.len() - 5];
        assert_eq!(codec.decode(truncated), Err(TokenError::Invalid));
    }

    #[test]
    fn test_expired_distinguished_from_invalid() {
        let codec = TokenCodec::with_ttl(SECRET, Duration::seconds(-30));
        let (token, _) = codec.issue("user-1", "alice", "c1", "r").unwrap();
        assert_eq!(codec.decode(&token), Err(TokenError::Expired));

        // Expired and forged is still just invalid
        let other = TokenCodec::with_ttl("other", Duration::seconds(-30));
        assert_eq!(other.decode(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_missing_claims_rejected() {
        #[derive(serde::Serialize)]
        struct Partial {
            sub: String,
            exp: i64,
        }
        let claims = Partial {
            sub: "user-1".to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let codec = TokenCodec::new(SECRET);
        assert_eq!(codec.decode(&token), Err(TokenError::Invalid));
    }
}

//! Process configuration, read once at startup from the environment.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::warn;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub access_token_ttl: chrono::Duration,
    pub session_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub sweep_timeout: Duration,
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
    pub shutdown_grace: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("bind_addr", &self.bind_addr)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweep_timeout", &self.sweep_timeout)
            .field("store_timeout", &self.store_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

/// Positive numeric env var, falling back to `default` when unset or unparsable.
fn positive<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

/// A lifetime that can be added to the current time without overflowing.
fn lifetime(
    key: &str,
    value: i64,
    unit: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration> {
    unit(value)
        .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
        .with_context(|| format!("{key}={value} is out of range"))
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must be set");
        }
        if jwt_secret.len() < MIN_SECRET_BYTES {
            warn!(
                "⚠️  JWT_SECRET is shorter than {} bytes; use a longer random secret",
                MIN_SECRET_BYTES
            );
        }

        let db_path = env::var("AUTH_DB_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("authservice.db"));

        let bind_addr = env::var("AUTH_BIND_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let access_token_ttl = lifetime(
            "ACCESS_TOKEN_TTL_HOURS",
            positive("ACCESS_TOKEN_TTL_HOURS", 24),
            chrono::Duration::try_hours,
        )?;
        let session_ttl = lifetime(
            "SESSION_TTL_DAYS",
            positive("SESSION_TTL_DAYS", 7),
            chrono::Duration::try_days,
        )?;

        Ok(Self {
            jwt_secret,
            db_path,
            bind_addr,
            access_token_ttl,
            session_ttl,
            sweep_interval: Duration::from_secs(positive("SESSION_SWEEP_INTERVAL_SECS", 3600)),
            sweep_timeout: Duration::from_secs(positive("SESSION_SWEEP_TIMEOUT_SECS", 30)),
            store_timeout: Duration::from_millis(positive("STORE_TIMEOUT_MS", 5000)),
            bcrypt_cost: positive("BCRYPT_COST", bcrypt::DEFAULT_COST).clamp(4, 31),
            shutdown_grace: Duration::from_secs(positive("SHUTDOWN_GRACE_SECS", 30)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: [&str; 11] = [
        "JWT_SECRET",
        "AUTH_DB_PATH",
        "AUTH_BIND_ADDR",
        "ACCESS_TOKEN_TTL_HOURS",
        "SESSION_TTL_DAYS",
        "SESSION_SWEEP_INTERVAL_SECS",
        "SESSION_SWEEP_TIMEOUT_SECS",
        "STORE_TIMEOUT_MS",
        "BCRYPT_COST",
        "SHUTDOWN_GRACE_SECS",
        "RUST_LOG",
    ];

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let mut all: Vec<(&str, Option<&str>)> = ALL_KEYS.iter().map(|k| (*k, None)).collect();
        for (key, value) in vars {
            all.retain(|(k, _)| k != key);
            all.push((key, Some(value)));
        }
        temp_env::with_vars(all, f);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        with_env(&[], || {
            assert!(AuthConfig::from_env().is_err());
        });
        with_env(&[("JWT_SECRET", "   ")], || {
            assert!(AuthConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_defaults() {
        with_env(&[("JWT_SECRET", "a-long-enough-secret-for-hs256-signing")], || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.bind_addr, "0.0.0.0:8080");
            assert!(config.db_path.ends_with("authservice.db"));
            assert_eq!(config.access_token_ttl, chrono::Duration::hours(24));
            assert_eq!(config.session_ttl, chrono::Duration::days(7));
            assert_eq!(config.sweep_interval, Duration::from_secs(3600));
            assert_eq!(config.sweep_timeout, Duration::from_secs(30));
            assert_eq!(config.store_timeout, Duration::from_millis(5000));
            assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
            assert_eq!(config.shutdown_grace, Duration::from_secs(30));
        });
    }

    #[test]
    fn test_overrides_and_bad_values() {
        with_env(
            &[
                ("JWT_SECRET", "short"),
                ("AUTH_DB_PATH", "/tmp/auth-test.db"),
                ("AUTH_BIND_ADDR", "127.0.0.1:9000"),
                ("SESSION_TTL_DAYS", "30"),
                ("STORE_TIMEOUT_MS", "not-a-number"),
                ("SESSION_SWEEP_INTERVAL_SECS", "0"),
                ("BCRYPT_COST", "99"),
            ],
            || {
                let config = AuthConfig::from_env().unwrap();
                assert_eq!(config.db_path, PathBuf::from("/tmp/auth-test.db"));
                assert_eq!(config.bind_addr, "127.0.0.1:9000");
                assert_eq!(config.session_ttl, chrono::Duration::days(30));
                assert_eq!(config.store_timeout, Duration::from_millis(5000));
                assert_eq!(config.sweep_interval, Duration::from_secs(3600));
                assert_eq!(config.bcrypt_cost, 31);
            },
        );
    }

    #[test]
    fn test_oversized_lifetimes_are_rejected() {
        const SECRET: &str = "a-long-enough-secret-for-hs256-signing";

        with_env(&[("JWT_SECRET", SECRET), ("SESSION_TTL_DAYS", "100000000")], || {
            let err = AuthConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SESSION_TTL_DAYS"));
        });
        with_env(
            &[("JWT_SECRET", SECRET), ("ACCESS_TOKEN_TTL_HOURS", "3000000000")],
            || {
                let err = AuthConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("ACCESS_TOKEN_TTL_HOURS"));
            },
        );
        // Large but representable values still load
        with_env(&[("JWT_SECRET", SECRET), ("SESSION_TTL_DAYS", "3650")], || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.session_ttl, chrono::Duration::days(3650));
        });
    }

    #[test]
    fn test_debug_redacts_secret() {
        with_env(&[("JWT_SECRET", "super-secret-value-that-is-long-enough")], || {
            let config = AuthConfig::from_env().unwrap();
            let printed = format!("{config:?}");
            assert!(!printed.contains("super-secret-value"));
            assert!(printed.contains("<redacted>"));
        });
    }
}

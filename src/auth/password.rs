//! Password Hasher
//! Mission: Salted one-way hashing with fail-closed verification

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::warn;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// bcrypt-backed hasher. Output embeds cost and salt (`$2b$<cost>$...`).
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password. Only fails if the OS entropy source does.
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        hash(plaintext, self.cost).context("Failed to hash password")
    }

    /// Constant-time check of `plaintext` against a stored hash.
    ///
    /// Any error from bcrypt (malformed hash, unsupported version) is a
    /// non-match.
    pub fn verify(&self, plaintext: &str, hash_value: &str) -> bool {
        match verify(plaintext, hash_value) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("password verification failed closed: {}", e);
                false
            }
        }
    }

    /// Spend one hash worth of work and discard it. Used on lookup misses so
    /// they cost about as much as a real verification.
    pub fn burn(&self, plaintext: &str) {
        let _ = hash(plaintext, self.cost);
    }
}

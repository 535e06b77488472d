//! Encryption domain models

use serde::{Deserialize, Serialize};

/// Default Argon2id parameters
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_MEMORY_COST: u32 = 65536; // 64 MiB
pub const DEFAULT_PARALLELISM: u32 = 4;
pub const DEFAULT_HASH_LEN: u32 = 32;

/// Minimum accepted length of the configured secret, in characters
pub const MIN_SECRET_LEN: usize = 16;

/// Minimum decoded salt length accepted by Argon2
pub const MIN_SALT_LEN: usize = 8;

/// Argon2id parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Argon2Params {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost: DEFAULT_MEMORY_COST,
            parallelism: DEFAULT_PARALLELISM,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

impl Argon2Params {
    /// Cheapest parameters Argon2 accepts (tests only; never for real keys)
    pub fn minimal() -> Self {
        Self {
            time_cost: 1,
            memory_cost: 8,
            parallelism: 1,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

/// Process-wide secret material for card field encryption
#[derive(Clone, PartialEq, Eq)]
pub struct CryptoSettings {
    pub secret_key: String,
    /// Base64-encoded salt
    pub salt: String,
    pub argon2: Argon2Params,
}

impl std::fmt::Debug for CryptoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoSettings")
            .field("secret_key", &"<redacted>")
            .field("salt", &self.salt)
            .field("argon2", &self.argon2)
            .finish()
    }
}

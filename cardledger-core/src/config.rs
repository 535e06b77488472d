//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "crypto": { "secretKey": "...", "salt": "<base64>", "argon2": { "timeCost": 3 } },
//!   "issuance": { "maxAttempts": 16, "luhnCheckDigit": false },
//!   "cards": { "validityYears": 3 },
//!   "concurrency": { "lockStripes": 256 }
//! }
//! ```
//! `CARDLEDGER_SECRET_KEY` and `CARDLEDGER_SALT` override the crypto values.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, CryptoSettings, MIN_SALT_LEN, MIN_SECRET_LEN};

pub const SETTINGS_FILE: &str = "settings.json";
pub const SECRET_KEY_ENV: &str = "CARDLEDGER_SECRET_KEY";
pub const SALT_ENV: &str = "CARDLEDGER_SALT";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    crypto: CryptoSection,
    #[serde(default)]
    issuance: IssuanceSettings,
    #[serde(default)]
    cards: CardSettings,
    #[serde(default)]
    concurrency: ConcurrencySettings,
    /// Keys this crate does not manage, preserved on save
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CryptoSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default)]
    argon2: Argon2Params,
}

/// Card number issuance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssuanceSettings {
    /// Candidates tried before giving up with an issuance error
    pub max_attempts: u32,
    /// Make the 16th digit a Luhn check digit
    pub luhn_check_digit: bool,
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            luhn_check_digit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardSettings {
    /// Default validity of a new card, in years
    pub validity_years: u32,
}

impl Default for CardSettings {
    fn default() -> Self {
        Self { validity_years: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcurrencySettings {
    /// Number of stripes in the card lock table
    pub lock_stripes: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self { lock_stripes: 256 }
    }
}

/// Values taken from the environment in preference to settings.json
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub secret_key: Option<String>,
    pub salt: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            secret_key: non_empty(SECRET_KEY_ENV),
            salt: non_empty(SALT_ENV),
        }
    }
}

/// Validated configuration
///
/// A `Config` only exists if the crypto secret is usable, so a context
/// built from one can always encrypt.
#[derive(Debug, Clone)]
pub struct Config {
    pub crypto: CryptoSettings,
    pub issuance: IssuanceSettings,
    pub cards: CardSettings,
    pub concurrency: ConcurrencySettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Configuration with default tunables around the given crypto settings
    pub fn new(crypto: CryptoSettings) -> Result<Self> {
        let config = Self {
            crypto,
            issuance: IssuanceSettings::default(),
            cards: CardSettings::default(),
            concurrency: ConcurrencySettings::default(),
            _raw_settings: SettingsFile::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load config from the data directory, applying environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with(data_dir, &EnvOverrides::from_env())
    }

    /// Load config with explicit overrides
    pub fn load_with(data_dir: &Path, overrides: &EnvOverrides) -> Result<Self> {
        let raw = Self::read_settings(data_dir)?;

        let secret_key = overrides
            .secret_key
            .clone()
            .or_else(|| raw.crypto.secret_key.clone())
            .ok_or_else(|| {
                Error::config(format!(
                    "no secret key configured: set crypto.secretKey in {} or {}",
                    SETTINGS_FILE, SECRET_KEY_ENV
                ))
            })?;
        let salt = overrides
            .salt
            .clone()
            .or_else(|| raw.crypto.salt.clone())
            .ok_or_else(|| {
                Error::config(format!(
                    "no salt configured: set crypto.salt in {} or {}",
                    SETTINGS_FILE, SALT_ENV
                ))
            })?;

        let config = Self {
            crypto: CryptoSettings {
                secret_key,
                salt,
                argon2: raw.crypto.argon2.clone(),
            },
            issuance: raw.issuance.clone(),
            cards: raw.cards.clone(),
            concurrency: raw.concurrency.clone(),
            _raw_settings: raw,
        };
        config.validate()?;
        Ok(config)
    }

    /// Write a fresh settings.json with the given secret and a random salt
    ///
    /// Existing unmanaged keys are preserved; an existing crypto section is
    /// replaced.
    pub fn init(data_dir: &Path, secret_key: &str) -> Result<Self> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut raw = Self::read_settings(data_dir)?;
        raw.crypto = CryptoSection {
            secret_key: Some(secret_key.to_string()),
            salt: Some(base64::engine::general_purpose::STANDARD.encode(salt)),
            argon2: Argon2Params::default(),
        };

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&raw)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;

        Self::load_with(data_dir, &EnvOverrides::default())
    }

    /// Save tunables to the data directory
    ///
    /// The crypto section on disk is left as it is, so secrets supplied
    /// through the environment never end up in the file.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = Self::read_settings(data_dir)?;

        settings.issuance = self.issuance.clone();
        settings.cards = self.cards.clone();
        settings.concurrency = self.concurrency.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        if !settings_path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = std::fs::read_to_string(&settings_path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("invalid {}: {}", SETTINGS_FILE, e)))
    }

    fn validate(&self) -> Result<()> {
        if self.crypto.secret_key.chars().count() < MIN_SECRET_LEN {
            return Err(Error::config(format!(
                "secret key must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        let salt = base64::engine::general_purpose::STANDARD
            .decode(self.crypto.salt.trim())
            .map_err(|e| Error::config(format!("salt is not valid base64: {}", e)))?;
        if salt.len() < MIN_SALT_LEN {
            return Err(Error::config(format!(
                "salt must decode to at least {} bytes",
                MIN_SALT_LEN
            )));
        }

        if self.crypto.argon2.hash_len != 32 {
            return Err(Error::config("argon2.hashLen must be 32 for AES-256"));
        }
        if self.issuance.max_attempts == 0 {
            return Err(Error::config("issuance.maxAttempts must be at least 1"));
        }
        if self.cards.validity_years == 0 {
            return Err(Error::config("cards.validityYears must be at least 1"));
        }
        if self.concurrency.lock_stripes == 0 {
            return Err(Error::config("concurrency.lockStripes must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::ErrorKind;
    use tempfile::tempdir;

    const SALT: &str = "c2FsdHNhbHRzYWx0"; // "saltsaltsalt"

    fn write_settings(dir: &Path, json: &str) {
        std::fs::write(dir.join(SETTINGS_FILE), json).unwrap();
    }

    #[test]
    fn test_missing_secret_prevents_start() {
        let dir = tempdir().unwrap();
        let err = Config::load_with(dir.path(), &EnvOverrides::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let dir = tempdir().unwrap();
        write_settings(
            dir.path(),
            &format!(
                r#"{{"crypto": {{"secretKey": "0123456789abcdef", "salt": "{}"}},
                    "issuance": {{"luhnCheckDigit": true}}}}"#,
                SALT
            ),
        );

        let config = Config::load_with(dir.path(), &EnvOverrides::default()).unwrap();
        assert!(config.issuance.luhn_check_digit);
        assert_eq!(config.issuance.max_attempts, 16);
        assert_eq!(config.cards.validity_years, 3);
        assert_eq!(config.concurrency.lock_stripes, 256);
        assert_eq!(config.crypto.argon2, Argon2Params::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        write_settings(
            dir.path(),
            r#"{"crypto": {"secretKey": "short", "salt": "!!"}}"#,
        );

        let overrides = EnvOverrides {
            secret_key: Some("a-much-longer-secret-key".to_string()),
            salt: Some(SALT.to_string()),
        };
        let config = Config::load_with(dir.path(), &overrides).unwrap();
        assert_eq!(config.crypto.secret_key, "a-much-longer-secret-key");
    }

    #[test]
    fn test_malformed_secret_material_rejected() {
        let short_secret = CryptoSettings {
            secret_key: "too-short".to_string(),
            salt: SALT.to_string(),
            argon2: Argon2Params::minimal(),
        };
        assert!(Config::new(short_secret).is_err());

        let bad_salt = CryptoSettings {
            secret_key: "0123456789abcdef".to_string(),
            salt: "not base64 at all".to_string(),
            argon2: Argon2Params::minimal(),
        };
        assert!(Config::new(bad_salt).is_err());

        let short_salt = CryptoSettings {
            secret_key: "0123456789abcdef".to_string(),
            salt: "YWJj".to_string(), // "abc"
            argon2: Argon2Params::minimal(),
        };
        assert!(Config::new(short_salt).is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempdir().unwrap();
        write_settings(dir.path(), "{ not json");
        let err = Config::load_with(dir.path(), &EnvOverrides::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_init_then_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        write_settings(dir.path(), r#"{"ui": {"theme": "dark"}}"#);

        let mut config = Config::init(dir.path(), "0123456789abcdef").unwrap();
        config.issuance.max_attempts = 4;
        config.save(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["ui"]["theme"], "dark");
        assert_eq!(json["issuance"]["maxAttempts"], 4);
        assert_eq!(json["crypto"]["secretKey"], "0123456789abcdef");

        let reloaded = Config::load_with(dir.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(reloaded.issuance.max_attempts, 4);
        assert_eq!(reloaded.crypto.salt, config.crypto.salt);
    }
}

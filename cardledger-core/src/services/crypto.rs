//! Card field encryption and display masking
//!
//! Sensitive card fields are sealed with AES-256-GCM under a key derived
//! from the process secret with Argon2id. The nonce is synthetic: it is
//! derived from the plaintext under a separate nonce key, so the same
//! plaintext always yields the same ciphertext. Equal ciphertexts therefore
//! mean equal card numbers, and the repository can enforce uniqueness on the
//! encrypted column.
//!
//! Text form: `v1:` + base64(nonce || ciphertext || tag).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, CryptoSettings};

const PREFIX: &str = "v1:";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const NONCE_DOMAIN: &[u8] = b"cardledger/synthetic-nonce/v1";

/// Fixed pattern shown in place of the hidden digits
pub const MASK_PREFIX: &str = "**** **** **** ";

/// Reversible encryption of card fields plus display masking
pub struct CardCrypto {
    cipher: Aes256Gcm,
    nonce_key: [u8; 32],
}

impl std::fmt::Debug for CardCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardCrypto").finish_non_exhaustive()
    }
}

impl CardCrypto {
    /// Derive the key from configured secret material
    pub fn from_settings(settings: &CryptoSettings) -> Result<Self> {
        let salt = base64::engine::general_purpose::STANDARD
            .decode(settings.salt.trim())
            .map_err(|e| Error::config(format!("salt is not valid base64: {}", e)))?;
        let key = derive_key(&settings.secret_key, &salt, &settings.argon2)?;
        Ok(Self::from_key(key))
    }

    /// Use an already derived 256-bit key
    pub fn from_key(key: [u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(NONCE_DOMAIN);
        let nonce_key: [u8; 32] = hasher.finalize().into();

        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            nonce_key,
        }
    }

    /// Encrypt a field; equal plaintexts give equal ciphertexts
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = self.synthetic_nonce(plaintext.as_bytes());
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::crypto("encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(format!(
            "{}{}",
            PREFIX,
            base64::engine::general_purpose::STANDARD.encode(blob)
        ))
    }

    /// Decrypt a value produced by [`CardCrypto::encrypt`] under the same key
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let encoded = ciphertext
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::crypto("unrecognized ciphertext format"))?;
        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| Error::crypto("ciphertext is not valid base64"))?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::crypto("ciphertext too short"));
        }

        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::crypto("ciphertext failed authentication"))?;
        String::from_utf8(plain).map_err(|_| Error::crypto("plaintext is not UTF-8"))
    }

    /// Display form: fixed pattern plus the last four characters
    ///
    /// Whitespace is stripped before taking the last four. Inputs shorter
    /// than four characters are returned unchanged.
    pub fn mask(plaintext: &str) -> String {
        if plaintext.chars().count() < 4 {
            return plaintext.to_string();
        }

        let cleaned: Vec<char> = plaintext.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.len() < 4 {
            return cleaned.into_iter().collect();
        }

        let last_four: String = cleaned[cleaned.len() - 4..].iter().collect();
        format!("{}{}", MASK_PREFIX, last_four)
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce_key);
        hasher.update(plaintext);
        let digest = hasher.finalize();

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

/// Derive a 256-bit key from a secret using Argon2id
fn derive_key(secret: &str, salt: &[u8], params: &Argon2Params) -> Result<[u8; 32]> {
    let argon2_params = argon2::Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| Error::config(format!("invalid argon2 params: {:?}", e)))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut key)
        .map_err(|e| Error::crypto(format!("failed to derive key: {:?}", e)))?;
    Ok(key)
}

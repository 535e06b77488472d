//! Card number issuance
//!
//! Candidates are 16 random digits shown as `DDDD-DDDD-DDDD-DDDD`. A
//! candidate is accepted once its encrypted form is absent from the
//! repository. Encryption is deterministic, so this check is exact.

use std::sync::Arc;

use crate::config::IssuanceSettings;
use crate::domain::result::{Error, Result};
use crate::ports::{RandomSource, Repository};
use crate::services::crypto::CardCrypto;

const DIGITS: usize = 16;
const GROUP: usize = 4;

/// A card number that was unused when it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedNumber {
    pub number: String,
    pub encrypted: String,
}

pub struct CardNumberIssuer {
    crypto: Arc<CardCrypto>,
    repository: Arc<dyn Repository>,
    random: Arc<dyn RandomSource>,
    settings: IssuanceSettings,
}

impl CardNumberIssuer {
    pub fn new(
        crypto: Arc<CardCrypto>,
        repository: Arc<dyn Repository>,
        random: Arc<dyn RandomSource>,
        settings: IssuanceSettings,
    ) -> Self {
        Self {
            crypto,
            repository,
            random,
            settings,
        }
    }

    /// Generate a card number not held by any persisted card
    ///
    /// Two concurrent issuers can still pick the same number; the
    /// repository's unique constraint turns that into an issuance error at
    /// insert time.
    pub fn issue(&self) -> Result<IssuedNumber> {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let number = self.candidate();
            let encrypted = self.crypto.encrypt(&number)?;
            if !self.repository.card_number_exists(&encrypted)? {
                if attempt > 1 {
                    tracing::debug!(attempt, "card number issued after collisions");
                }
                return Ok(IssuedNumber { number, encrypted });
            }
            tracing::debug!(attempt, "card number collision, retrying");
        }

        tracing::warn!(max_attempts, "card number issuance exhausted");
        Err(Error::issuance(format!(
            "could not find an unused card number in {} attempts",
            max_attempts
        )))
    }

    /// One grouped candidate number
    pub fn candidate(&self) -> String {
        let mut digits: Vec<u8> = (0..DIGITS)
            .map(|_| self.random.next_below(10) as u8)
            .collect();
        if self.settings.luhn_check_digit {
            digits[DIGITS - 1] = luhn_check_digit(&digits[..DIGITS - 1]);
        }
        format_grouped(&digits)
    }

    /// Three-digit CVV, zero padded
    pub fn generate_cvv(&self) -> String {
        format!("{:03}", self.random.next_below(1000))
    }
}

fn format_grouped(digits: &[u8]) -> String {
    digits
        .chunks(GROUP)
        .map(|group| group.iter().map(|d| char::from(b'0' + d)).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Luhn check digit for a payload of decimal digits
pub fn luhn_check_digit(payload: &[u8]) -> u8 {
    // Doubling starts at the rightmost payload digit
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Check a number against the Luhn checksum
///
/// Dashes and whitespace are ignored. Anything else non-numeric, or fewer
/// than two digits, is invalid.
pub fn is_valid_luhn(number: &str) -> bool {
    let mut digits = Vec::with_capacity(number.len());
    for c in number.chars() {
        match c {
            '0'..='9' => digits.push(c as u8 - b'0'),
            '-' => {}
            c if c.is_whitespace() => {}
            _ => return false,
        }
    }
    match digits.split_last() {
        Some((&check, payload)) if !payload.is_empty() => luhn_check_digit(payload) == check,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRepository;
    use crate::adapters::random::SeededRandom;
    use crate::domain::{Card, CardType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays a fixed digit script
    struct ScriptedRandom {
        values: Mutex<VecDeque<u32>>,
    }

    impl ScriptedRandom {
        fn new(values: impl IntoIterator<Item = u32>) -> Self {
            Self {
                values: Mutex::new(values.into_iter().collect()),
            }
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_below(&self, bound: u32) -> u32 {
            self.values.lock().unwrap().pop_front().unwrap_or(0) % bound
        }

        fn fill_bytes(&self, dest: &mut [u8]) {
            dest.fill(0);
        }
    }

    fn issuer(
        repo: Arc<MemoryRepository>,
        random: Arc<dyn RandomSource>,
        settings: IssuanceSettings,
    ) -> CardNumberIssuer {
        CardNumberIssuer::new(Arc::new(CardCrypto::from_key([1u8; 32])), repo, random, settings)
    }

    fn persist_number(repo: &MemoryRepository, encrypted: String) {
        let card = Card::new(
            Uuid::new_v4(),
            encrypted,
            "v1:cvv".to_string(),
            "Holder",
            CardType::Debit,
            "USD",
            Decimal::ZERO,
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        );
        repo.insert_card(&card).unwrap();
    }

    #[test]
    fn test_candidate_format() {
        let repo = Arc::new(MemoryRepository::new());
        let issuer = issuer(repo, Arc::new(SeededRandom::new(1)), IssuanceSettings::default());
        let number = issuer.candidate();

        assert_eq!(number.len(), 19);
        for (i, c) in number.chars().enumerate() {
            if i % 5 == 4 {
                assert_eq!(c, '-');
            } else {
                assert!(c.is_ascii_digit());
            }
        }
    }

    #[test]
    fn test_retries_past_existing_number() {
        let repo = Arc::new(MemoryRepository::new());
        let crypto = CardCrypto::from_key([1u8; 32]);
        persist_number(&repo, crypto.encrypt("1111-1111-1111-1111").unwrap());

        // First candidate is all ones, second all twos
        let script = std::iter::repeat(1).take(16).chain(std::iter::repeat(2).take(16));
        let issuer = issuer(
            repo,
            Arc::new(ScriptedRandom::new(script)),
            IssuanceSettings::default(),
        );

        let issued = issuer.issue().unwrap();
        assert_eq!(issued.number, "2222-2222-2222-2222");
        assert_eq!(crypto.decrypt(&issued.encrypted).unwrap(), issued.number);
    }

    #[test]
    fn test_exhaustion_is_issuance_error() {
        let repo = Arc::new(MemoryRepository::new());
        let crypto = CardCrypto::from_key([1u8; 32]);
        persist_number(&repo, crypto.encrypt("0000-0000-0000-0000").unwrap());

        // Script empties immediately, so every candidate is all zeros
        let issuer = issuer(
            repo,
            Arc::new(ScriptedRandom::new([])),
            IssuanceSettings {
                max_attempts: 3,
                luhn_check_digit: false,
            },
        );

        let err = issuer.issue().unwrap_err();
        assert!(matches!(err, Error::Issuance(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_luhn_mode_produces_valid_numbers() {
        let repo = Arc::new(MemoryRepository::new());
        let issuer = issuer(
            repo,
            Arc::new(SeededRandom::new(42)),
            IssuanceSettings {
                max_attempts: 16,
                luhn_check_digit: true,
            },
        );
        for _ in 0..50 {
            assert!(is_valid_luhn(&issuer.candidate()));
        }
    }

    #[test]
    fn test_known_luhn_values() {
        assert!(is_valid_luhn("4111-1111-1111-1111"));
        assert!(is_valid_luhn("4539 1488 0343 6467"));
        assert!(!is_valid_luhn("4111-1111-1111-1112"));
        assert!(!is_valid_luhn("4111x1111"));
        assert!(!is_valid_luhn("7"));
        assert_eq!(luhn_check_digit(&[7, 9, 9, 2, 7, 3, 9, 8, 7, 1]), 3);
    }

    #[test]
    fn test_cvv_is_zero_padded() {
        let repo = Arc::new(MemoryRepository::new());
        let issuer = issuer(
            repo,
            Arc::new(ScriptedRandom::new([7, 42, 999])),
            IssuanceSettings::default(),
        );
        assert_eq!(issuer.generate_cvv(), "007");
        assert_eq!(issuer.generate_cvv(), "042");
        assert_eq!(issuer.generate_cvv(), "999");
    }
}

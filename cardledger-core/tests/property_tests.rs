//! Property-based tests for masking, check digits and transfer accounting
//!
//! Run with: cargo test --test property_tests

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use cardledger_core::adapters::memory::MemoryRepository;
use cardledger_core::adapters::random::SeededRandom;
use cardledger_core::config::Config;
use cardledger_core::domain::{Argon2Params, CryptoSettings};
use cardledger_core::services::issuer::luhn_check_digit;
use cardledger_core::services::{is_valid_luhn, CardCrypto};
use cardledger_core::{CardLedgerContext, CardType, Error, NewCard, PageRequest, TransferRequest};

fn memory_context(seed: u64) -> CardLedgerContext {
    let config = Config::new(CryptoSettings {
        secret_key: "property-secret-key".to_string(),
        salt: "c2FsdHNhbHRzYWx0".to_string(),
        argon2: Argon2Params::minimal(),
    })
    .unwrap();

    CardLedgerContext::with_parts(
        config,
        Arc::new(MemoryRepository::new()),
        Arc::new(CardCrypto::from_key([7u8; 32])),
        Arc::new(SeededRandom::new(seed)),
    )
}

fn transfer_strategy() -> impl Strategy<Value = (usize, usize, i64)> {
    (0usize..3, 0usize..3, 1i64..50_000)
}

proptest! {
    /// Masks show the fixed prefix and exactly the last four digits
    #[test]
    fn prop_mask_keeps_last_four(number in "[0-9]{4,24}") {
        let masked = CardCrypto::mask(&number);
        prop_assert_eq!(masked, format!("**** **** **** {}", &number[number.len() - 4..]));
    }

    /// Values shorter than four characters are shown as they are
    #[test]
    fn prop_mask_short_values_unchanged(value in "[0-9]{0,3}") {
        prop_assert_eq!(CardCrypto::mask(&value), value);
    }

    /// A computed check digit validates, and any single-digit change breaks it
    #[test]
    fn prop_luhn_detects_single_digit_errors(
        payload in proptest::collection::vec(0u8..10, 15),
        position in 0usize..16,
        delta in 1u8..10,
    ) {
        let mut digits = payload.clone();
        digits.push(luhn_check_digit(&payload));
        let number: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        prop_assert!(is_valid_luhn(&number));

        digits[position] = (digits[position] + delta) % 10;
        let corrupted: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        prop_assert!(!is_valid_luhn(&corrupted));
    }

    /// Equal plaintexts encrypt to equal ciphertexts that decrypt back
    #[test]
    fn prop_encryption_is_deterministic(plaintext in "[0-9-]{1,40}") {
        let crypto = CardCrypto::from_key([3u8; 32]);
        let first = crypto.encrypt(&plaintext).unwrap();
        let second = crypto.encrypt(&plaintext).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(crypto.decrypt(&first).unwrap(), plaintext);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of transfers conserves the owner's total, never drives a
    /// balance negative and logs exactly one transaction per success
    #[test]
    fn prop_transfers_conserve_total(
        seed in any::<u64>(),
        opening in proptest::collection::vec(0i64..100_000, 3),
        transfers in proptest::collection::vec(transfer_strategy(), 1..40),
    ) {
        let ctx = memory_context(seed);
        let owner = Uuid::new_v4();

        let cards: Vec<Uuid> = opening
            .iter()
            .map(|cents| {
                ctx.ledger
                    .create(
                        owner,
                        &NewCard::new("Prop", CardType::Debit, "USD", Decimal::new(*cents, 2)),
                    )
                    .unwrap()
                    .id
            })
            .collect();
        let total: Decimal = opening.iter().map(|c| Decimal::new(*c, 2)).sum();

        let mut successes = 0;
        for (from, to, cents) in transfers {
            let amount = Decimal::new(cents, 2);
            let available = ctx.ledger.get_balance(cards[from], owner).unwrap().balance;
            let request = TransferRequest::new(cards[from], cards[to], amount, "USD");

            match ctx.transfers.transfer(owner, &request) {
                Ok(_) => {
                    prop_assert!(from != to);
                    prop_assert!(amount <= available);
                    successes += 1;
                }
                Err(Error::InsufficientFunds { .. }) => prop_assert!(amount > available),
                Err(Error::Validation(_)) => prop_assert_eq!(from, to),
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }

            let balances: Vec<Decimal> = cards
                .iter()
                .map(|id| ctx.ledger.get_balance(*id, owner).unwrap().balance)
                .collect();
            prop_assert!(balances.iter().all(|b| *b >= Decimal::ZERO));
            prop_assert_eq!(balances.iter().copied().sum::<Decimal>(), total);
        }

        let history = ctx
            .transfers
            .list_transfers(owner, PageRequest::new(0, 100))
            .unwrap();
        prop_assert_eq!(history.total_items, successes);
    }
}

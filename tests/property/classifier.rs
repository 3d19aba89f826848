//! Classifier determinism and round-trip stability.

use proptest::prelude::*;
use rungate_core::classify::{classify, ErrorCategory, RawError};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Same input, same output.
    #[test]
    fn classification_is_deterministic(
        status in proptest::option::of(100u16..600),
        message in ".{0,120}",
    ) {
        let err = RawError { status, message };
        prop_assert_eq!(classify(&err), classify(&err));
    }

    /// Re-classifying a classifier-produced message keeps the category.
    #[test]
    fn produced_messages_reclassify_stably(
        status in proptest::option::of(100u16..600),
        message in ".{0,120}",
    ) {
        let first = classify(&RawError { status, message });
        let second = classify(&RawError::message(first.message.clone()));
        prop_assert_eq!(first.category, second.category);
    }

    /// Terminal categories never advertise retries; retryable ones always
    /// allow at least one.
    #[test]
    fn retryability_matches_retry_budget(
        status in proptest::option::of(100u16..600),
        message in ".{0,120}",
    ) {
        let c = classify(&RawError { status, message });
        if c.retryable {
            prop_assert!(c.max_retries >= 1);
        } else {
            prop_assert_eq!(c.max_retries, 0);
        }
        prop_assert_eq!(c.category.is_terminal(), !c.retryable);
    }

    /// Backoff delays are monotone in the attempt number and capped at 60 s.
    #[test]
    fn delays_are_monotone_and_capped(
        status in proptest::option::of(100u16..600),
        message in ".{0,120}",
        attempts in 1u32..20,
    ) {
        let c = classify(&RawError { status, message });
        let mut last = 0;
        for attempt in 1..=attempts {
            let delay = c.delay_for(attempt);
            prop_assert!(delay <= 60_000);
            prop_assert!(delay >= last || delay == 60_000);
            last = delay;
        }
    }

    /// Unknown messages surface verbatim, capped at 100 characters.
    #[test]
    fn unknown_messages_are_capped(message in "[a-z ]{0,200}") {
        let c = classify(&RawError::message(message.clone()));
        if c.category == ErrorCategory::Unknown {
            prop_assert!(c.message.chars().count() <= 100);
            prop_assert!(message.starts_with(&c.message));
        }
    }
}

//! Penalty controller invariants.

use proptest::prelude::*;
use rungate_core::clock::ManualClock;
use rungate_penalty::{DecayStrategy, PenaltyConfig, PenaltyController, PenaltyReason};

fn reason_strategy() -> impl Strategy<Value = PenaltyReason> {
    prop_oneof![
        Just(PenaltyReason::RateLimit),
        Just(PenaltyReason::Capacity),
        Just(PenaltyReason::Timeout),
        Just(PenaltyReason::SchemaViolation),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Raise(PenaltyReason),
    Lower,
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        reason_strategy().prop_map(Op::Raise),
        Just(Op::Lower),
        (1u64..5_000).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The penalty stays within [0, max_penalty] under any sequence of
    /// raises, lowers, and idle time.
    #[test]
    fn penalty_stays_in_bounds(
        ops in proptest::collection::vec(op_strategy(), 1..80),
        max_penalty in 1.0f64..20.0,
    ) {
        let clock = ManualClock::shared(0);
        let config = PenaltyConfig::builder()
            .stable(false)
            .max_penalty(max_penalty)
            .decay_ms(1_000)
            .decay_strategy(DecayStrategy::Hybrid)
            .build();
        let controller = PenaltyController::new(config, clock.clone());

        for op in ops {
            match op {
                Op::Raise(reason) => controller.raise(reason),
                Op::Lower => controller.lower(),
                Op::Advance(ms) => clock.advance(ms),
            }
            let penalty = controller.penalty();
            prop_assert!(penalty >= 0.0, "penalty went negative: {penalty}");
            prop_assert!(
                penalty <= max_penalty,
                "penalty {penalty} above ceiling {max_penalty}"
            );
        }
    }

    /// With linear decay, any idle stretch of at least
    /// `decay_ms * ceil(max_penalty)` drains the penalty to zero.
    #[test]
    fn linear_penalty_drains_after_enough_idle(
        raises in proptest::collection::vec(reason_strategy(), 1..20),
        extra_idle in 0u64..10_000,
    ) {
        let clock = ManualClock::shared(0);
        let max_penalty = 5.0;
        let decay_ms = 1_000u64;
        let config = PenaltyConfig::builder()
            .stable(false)
            .max_penalty(max_penalty)
            .decay_ms(decay_ms)
            .decay_strategy(DecayStrategy::Linear)
            .build();
        let controller = PenaltyController::new(config, clock.clone());

        for reason in raises {
            controller.raise(reason);
        }

        clock.advance(decay_ms * (max_penalty.ceil() as u64) + extra_idle);
        prop_assert_eq!(controller.penalty(), 0.0);
    }

    /// The stable profile is inert regardless of the error stream.
    #[test]
    fn stable_profile_ignores_all_raises(
        raises in proptest::collection::vec(reason_strategy(), 0..40),
        base in 0u32..100,
    ) {
        let clock = ManualClock::shared(0);
        let controller = PenaltyController::new(PenaltyConfig::default(), clock);

        for reason in raises {
            controller.raise(reason);
        }
        prop_assert_eq!(controller.penalty(), 0.0);
        prop_assert_eq!(controller.apply_limit(base), base);
    }

    /// apply_limit never returns zero for a positive base, no matter how
    /// high the penalty.
    #[test]
    fn effective_limit_has_a_floor_of_one(
        raises in proptest::collection::vec(reason_strategy(), 1..40),
        base in 1u32..100,
    ) {
        let clock = ManualClock::shared(0);
        let config = PenaltyConfig::builder()
            .stable(false)
            .max_penalty(50.0)
            .build();
        let controller = PenaltyController::new(config, clock);

        for reason in raises {
            controller.raise(reason);
        }
        prop_assert!(controller.apply_limit(base) >= 1);
    }
}

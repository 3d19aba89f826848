//! Ledger invariants under arbitrary reserve/consume/release/expire
//! interleavings.

use proptest::prelude::*;
use rungate_core::clock::ManualClock;
use rungate_ledger::{CapacityLedger, CapacityLimits, ReservationLease, SlotKind};

const LIMIT: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Reserve { req: u32, llm: u32, ttl: u64 },
    ReserveConsume { team: bool, req: u32, llm: u32 },
    Release { index: usize },
    Heartbeat { index: usize, ttl: Option<u64> },
    Advance { ms: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..4, 0u32..4, 1u64..5_000)
            .prop_map(|(req, llm, ttl)| Op::Reserve { req, llm, ttl }),
        (any::<bool>(), 0u32..4, 0u32..4)
            .prop_map(|(team, req, llm)| Op::ReserveConsume { team, req, llm }),
        (0usize..16).prop_map(|index| Op::Release { index }),
        (0usize..16, proptest::option::of(1u64..5_000))
            .prop_map(|(index, ttl)| Op::Heartbeat { index, ttl }),
        (1u64..3_000).prop_map(|ms| Op::Advance { ms }),
    ]
}

fn release_held(ledger: &CapacityLedger, lease: ReservationLease, kind: Option<SlotKind>) {
    if let Some(kind) = kind {
        ledger.release_slots(kind, lease.additional_requests(), lease.additional_llm());
    }
    lease.release();
    // a second release must be a no-op
    lease.release();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Counters and reservations never exceed the configured limits, and
    /// releasing everything returns the ledger to its empty state.
    #[test]
    fn counters_stay_within_limits(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let clock = ManualClock::shared(0);
        let limits = CapacityLimits::builder()
            .max_total_active_requests(LIMIT)
            .max_total_active_llm(LIMIT)
            .build()
            .unwrap();
        let ledger = CapacityLedger::builder(limits).clock(clock.clone()).build();
        let mut held: Vec<(ReservationLease, Option<SlotKind>)> = Vec::new();

        for op in ops {
            match op {
                Op::Reserve { req, llm, ttl } => {
                    if let Some(lease) = ledger.reserve("prop", req, llm, ttl) {
                        held.push((lease, None));
                    }
                }
                Op::ReserveConsume { team, req, llm } => {
                    let kind = if team { SlotKind::Team } else { SlotKind::Subagent };
                    if let Some(lease) =
                        ledger.reserve_and_consume("prop", kind, req, llm, 60_000)
                    {
                        held.push((lease, Some(kind)));
                    }
                }
                Op::Release { index } => {
                    if !held.is_empty() {
                        let (lease, kind) = held.remove(index % held.len());
                        release_held(&ledger, lease, kind);
                    }
                }
                Op::Heartbeat { index, ttl } => {
                    if !held.is_empty() {
                        let (lease, _) = &held[index % held.len()];
                        let _ = lease.heartbeat(ttl);
                    }
                }
                Op::Advance { ms } => {
                    // pure reservations may expire under us; releasing a
                    // swept lease later is a no-op, so the handles stay
                    clock.advance(ms);
                    ledger.sweep_expired();
                }
            }

            let snapshot = ledger.snapshot();
            prop_assert!(
                snapshot.total_active_requests + snapshot.reserved_requests <= LIMIT,
                "requests over limit: {snapshot:?}"
            );
            prop_assert!(
                snapshot.total_active_llm + snapshot.reserved_llm <= LIMIT,
                "llm over limit: {snapshot:?}"
            );
        }

        for (lease, kind) in held.drain(..) {
            release_held(&ledger, lease, kind);
        }
        clock.advance(120_000);
        ledger.sweep_expired();

        let end = ledger.snapshot();
        prop_assert_eq!(end.total_active_requests, 0);
        prop_assert_eq!(end.total_active_llm, 0);
        prop_assert_eq!(end.pending_reservations, 0);
        prop_assert_eq!(end.reserved_requests, 0);
    }

    /// A reserve → consume → release round trip restores the exact
    /// pre-reserve snapshot.
    #[test]
    fn reserve_consume_release_round_trips(
        req in 0u32..=LIMIT,
        llm in 0u32..=LIMIT,
        consume in any::<bool>(),
    ) {
        let clock = ManualClock::shared(0);
        let limits = CapacityLimits::builder()
            .max_total_active_requests(LIMIT)
            .max_total_active_llm(LIMIT)
            .build()
            .unwrap();
        let ledger = CapacityLedger::builder(limits).clock(clock).build();

        let before = ledger.snapshot();
        let lease = ledger.reserve("prop", req, llm, 10_000).expect("fits");
        if consume {
            lease.consume();
        }
        lease.release();
        prop_assert_eq!(ledger.snapshot(), before);
    }
}

//! Queue ordering invariants.

use proptest::prelude::*;
use rungate_scheduler::{Priority, ScoreWeights, TaskDescriptor, WaitQueue};
use std::collections::HashMap;

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Critical),
        Just(Priority::High),
        Just(Priority::Normal),
        Just(Priority::Low),
        Just(Priority::Background),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Entries that share tenant, priority, class, and estimates dispatch in
    /// enqueue order.
    #[test]
    fn identical_entries_dispatch_fifo(count in 1usize..40) {
        let mut queue = WaitQueue::new(ScoreWeights::default(), 256, 3);
        for i in 0..count {
            queue
                .enqueue(
                    TaskDescriptor::builder(format!("t{i}"), "tool")
                        .tenant_key("shared")
                        .build(),
                    i as u64,
                )
                .unwrap();
        }

        for i in 0..count {
            let entry = queue.pick_next(count as u64, |_| true).expect("entry");
            prop_assert_eq!(entry.task.id, format!("t{i}"));
        }
        prop_assert!(queue.is_empty());
    }

    /// While a critical entry is pending and fits, the next dispatch is
    /// critical.
    #[test]
    fn critical_always_dispatches_first(
        priorities in proptest::collection::vec(priority_strategy(), 1..40),
    ) {
        let mut queue = WaitQueue::new(ScoreWeights::default(), 256, 3);
        for (i, priority) in priorities.iter().enumerate() {
            queue
                .enqueue(
                    TaskDescriptor::builder(format!("t{i}"), "tool")
                        .tenant_key(format!("tenant-{}", i % 3))
                        .priority(*priority)
                        .build(),
                    i as u64,
                )
                .unwrap();
        }

        let mut now = priorities.len() as u64;
        while !queue.is_empty() {
            let critical_pending = queue.snapshot().priority_stats.critical > 0;
            let entry = queue.pick_next(now, |_| true).expect("entry");
            if critical_pending {
                prop_assert_eq!(entry.task.priority, Priority::Critical);
            }
            now += 1;
        }
    }

    /// Priority stats always mirror the pending entries exactly.
    #[test]
    fn priority_stats_mirror_pending(
        priorities in proptest::collection::vec(priority_strategy(), 1..40),
        removals in proptest::collection::vec(0usize..40, 0..10),
    ) {
        let mut queue = WaitQueue::new(ScoreWeights::default(), 256, 3);
        let mut by_id: HashMap<String, Priority> = HashMap::new();
        for (i, priority) in priorities.iter().enumerate() {
            let id = format!("t{i}");
            queue
                .enqueue(
                    TaskDescriptor::builder(&id, "tool").priority(*priority).build(),
                    i as u64,
                )
                .unwrap();
            by_id.insert(id, *priority);
        }

        for removal in removals {
            let id = format!("t{removal}");
            if queue.remove(&id).is_some() {
                by_id.remove(&id);
            }
        }

        let stats = queue.snapshot().priority_stats;
        for priority in [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
            Priority::Background,
        ] {
            let expected = by_id.values().filter(|p| **p == priority).count();
            prop_assert_eq!(stats.get(priority), expected);
        }
        prop_assert_eq!(stats.total(), queue.len());
    }

    /// The queue never exceeds its cap, and only low tiers are ever evicted.
    #[test]
    fn eviction_respects_cap_and_priority_floor(
        priorities in proptest::collection::vec(priority_strategy(), 1..60),
        cap in 1usize..16,
    ) {
        let mut queue = WaitQueue::new(ScoreWeights::default(), cap, 3);
        for (i, priority) in priorities.iter().enumerate() {
            let outcome = queue.enqueue(
                TaskDescriptor::builder(format!("t{i}"), "tool")
                    .priority(*priority)
                    .build(),
                i as u64,
            );
            if let Ok(rungate_scheduler::EnqueueOutcome::Enqueued { evicted }) = outcome {
                for entry in evicted {
                    prop_assert!(entry.task.priority.is_evictable());
                }
            }
            prop_assert!(queue.len() <= cap);
        }
    }
}

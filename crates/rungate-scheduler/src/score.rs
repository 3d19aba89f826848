//! Composite dequeue scoring.

use crate::queue::WaitEntry;
use std::collections::HashMap;

/// Skip counts at or above this saturate the starvation boost.
const SKIP_BOOST_CAP: u32 = 10;

/// Weights for the composite dequeue score.
///
/// The defaults keep the terms strictly layered: priority dominates class,
/// which dominates everything a deadline or starvation boost can add within
/// one tier. They are configuration rather than constants; tune against a
/// real workload before trusting them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the priority rank. Default 1000.
    pub priority: f64,
    /// Weight of the queue-class rank. Default 100.
    pub queue_class: f64,
    /// Weight of deadline pressure. Default 500.
    pub deadline: f64,
    /// Weight of the shortest-job-first term. Default 50.
    pub sjf: f64,
    /// Weight of the tenant fair-share bonus. Default 30.
    pub fair_share: f64,
    /// Weight of the skip-count starvation boost. Default 200.
    pub starvation: f64,
    /// Horizon over which deadline pressure ramps from 0 to 1. Default 60 s.
    pub deadline_horizon_ms: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            priority: 1_000.0,
            queue_class: 100.0,
            deadline: 500.0,
            sjf: 50.0,
            fair_share: 30.0,
            starvation: 200.0,
            deadline_horizon_ms: 60_000,
        }
    }
}

impl ScoreWeights {
    /// Scores a waiting entry at `now_ms`.
    ///
    /// `tenant_dispatches` maps tenant keys to their recent dispatch counts;
    /// tenants with fewer dispatches earn a larger fair-share bonus.
    pub fn score(
        &self,
        entry: &WaitEntry,
        now_ms: u64,
        tenant_dispatches: &HashMap<String, u64>,
    ) -> f64 {
        let task = &entry.task;

        let priority_term = f64::from(task.priority.rank()) * self.priority;
        let class_term = f64::from(task.queue_class.rank()) * self.queue_class;
        let deadline_term = self.deadline_factor(task.deadline_ms, now_ms) * self.deadline;
        let sjf_term = (1.0 / task.estimated_duration_ms.max(1) as f64) * self.sjf;

        let dispatched = tenant_dispatches
            .get(&task.tenant_key)
            .copied()
            .unwrap_or(0);
        let fair_term = (1.0 / (1.0 + dispatched as f64)) * self.fair_share;

        let boost = f64::from(entry.skip_count.min(SKIP_BOOST_CAP)) / f64::from(SKIP_BOOST_CAP);
        let starvation_term = boost * self.starvation;

        priority_term + class_term + deadline_term + sjf_term + fair_term + starvation_term
    }

    /// Deadline pressure in [0, 1]: 0 with the whole horizon remaining,
    /// 1 at (or past) the deadline.
    fn deadline_factor(&self, deadline_ms: Option<u64>, now_ms: u64) -> f64 {
        let Some(deadline) = deadline_ms else {
            return 0.0;
        };
        let remaining = deadline.saturating_sub(now_ms) as f64;
        let horizon = self.deadline_horizon_ms.max(1) as f64;
        (1.0 - remaining / horizon).clamp(0.0, 1.0)
    }
}

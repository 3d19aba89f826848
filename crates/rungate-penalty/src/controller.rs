//! The penalty controller.

use crate::config::{DecayStrategy, PenaltyConfig};
use rungate_core::classify::ErrorCategory;
use rungate_core::clock::Clock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Exponential decay never reaches zero exactly; values below this snap to 0.
const ZERO_SNAP: f64 = 0.01;

/// Reasons that raise the penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenaltyReason {
    /// Provider rate limiting.
    RateLimit,
    /// Provider-side capacity exhaustion.
    Capacity,
    /// Request timeout.
    Timeout,
    /// Output failed downstream schema validation.
    SchemaViolation,
}

impl PenaltyReason {
    /// Maps an error category to a penalty reason, when one applies.
    pub fn from_category(category: ErrorCategory) -> Option<PenaltyReason> {
        match category {
            ErrorCategory::RateLimit => Some(PenaltyReason::RateLimit),
            ErrorCategory::Capacity => Some(PenaltyReason::Capacity),
            ErrorCategory::Timeout => Some(PenaltyReason::Timeout),
            ErrorCategory::SchemaViolation => Some(PenaltyReason::SchemaViolation),
            _ => None,
        }
    }

    /// Stable tag for logs and history.
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyReason::RateLimit => "rate_limit",
            PenaltyReason::Capacity => "capacity",
            PenaltyReason::Timeout => "timeout",
            PenaltyReason::SchemaViolation => "schema_violation",
        }
    }
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone)]
pub struct PenaltySnapshot {
    /// Current penalty value after decay.
    pub penalty: f64,
    /// Most recent raise reason.
    pub last_reason: Option<PenaltyReason>,
    /// Bounded history of raise reasons, oldest first.
    pub reason_history: Vec<PenaltyReason>,
    /// When the penalty last changed.
    pub updated_at_ms: u64,
}

#[derive(Debug)]
struct PenaltyState {
    penalty: f64,
    updated_at_ms: u64,
    last_reason: Option<PenaltyReason>,
    history: VecDeque<PenaltyReason>,
}

/// Per-scope feedback controller mapping error pressure to parallelism.
///
/// Thread-safe; typically one controller per provider+model scope, shared
/// through a [`crate::PenaltyRegistry`].
pub struct PenaltyController {
    config: PenaltyConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PenaltyState>,
}

impl PenaltyController {
    /// Creates a controller starting at zero penalty.
    pub fn new(config: PenaltyConfig, clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now_ms();
        Self {
            config,
            clock,
            state: Mutex::new(PenaltyState {
                penalty: 0.0,
                updated_at_ms: now_ms,
                last_reason: None,
                history: VecDeque::new(),
            }),
        }
    }

    /// The controller's configuration.
    pub fn config(&self) -> &PenaltyConfig {
        &self.config
    }

    fn decay_locked(&self, state: &mut PenaltyState, now_ms: u64) {
        if state.penalty <= 0.0 {
            state.updated_at_ms = now_ms;
            return;
        }
        let elapsed = now_ms.saturating_sub(state.updated_at_ms);
        let steps = elapsed / self.config.decay_ms;
        if steps == 0 {
            return;
        }

        let mut penalty = state.penalty;
        match self.config.strategy {
            DecayStrategy::Linear => {
                penalty -= steps as f64;
            }
            DecayStrategy::Exponential => {
                penalty *= self.config.exponential_base.powi(steps.min(i32::MAX as u64) as i32);
            }
            DecayStrategy::Hybrid => {
                // step at a time so the regime switch applies mid-decay
                for _ in 0..steps.min(1_000) {
                    if penalty > 5.0 {
                        penalty *= 0.7;
                    } else {
                        penalty -= 1.0;
                    }
                    if penalty <= 0.0 {
                        break;
                    }
                }
            }
        }

        if penalty < ZERO_SNAP {
            penalty = 0.0;
        }
        state.penalty = penalty.max(0.0);
        // keep the fractional remainder of the last step
        state.updated_at_ms = state
            .updated_at_ms
            .saturating_add(steps * self.config.decay_ms);
    }

    /// Applies idle decay up to now. No-op in the stable profile.
    pub fn decay(&self) {
        if self.config.stable {
            return;
        }
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        self.decay_locked(&mut state, now_ms);
    }

    /// Raises the penalty by the configured weight for `reason`.
    /// No-op in the stable profile.
    pub fn raise(&self, reason: PenaltyReason) {
        if self.config.stable {
            return;
        }
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        self.decay_locked(&mut state, now_ms);

        let weight = self.config.weights.weight(reason);
        state.penalty = (state.penalty + weight).min(self.config.max_penalty);
        state.updated_at_ms = now_ms;
        state.last_reason = Some(reason);
        state.history.push_back(reason);
        while state.history.len() > self.config.history_cap {
            state.history.pop_front();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            reason = reason.as_str(),
            penalty = state.penalty,
            "penalty raised"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "rungate_penalty_raises_total",
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    /// Lowers the penalty by one. No-op in the stable profile.
    pub fn lower(&self) {
        if self.config.stable {
            return;
        }
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        self.decay_locked(&mut state, now_ms);
        state.penalty = (state.penalty - 1.0).max(0.0);
        state.updated_at_ms = now_ms;
    }

    /// Current penalty after decay.
    pub fn penalty(&self) -> f64 {
        if self.config.stable {
            return 0.0;
        }
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        self.decay_locked(&mut state, now_ms);
        state.penalty
    }

    /// Maps a base limit to the penalty-reduced effective limit:
    /// `max(1, floor(base / (penalty + 1)))`.
    pub fn apply_limit(&self, base_limit: u32) -> u32 {
        if self.config.stable {
            return base_limit;
        }
        let penalty = self.penalty();
        let effective = (f64::from(base_limit) / (penalty + 1.0)).floor() as u32;
        effective.max(1)
    }

    /// Snapshot of the controller state for observability.
    pub fn snapshot(&self) -> PenaltySnapshot {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        if !self.config.stable {
            self.decay_locked(&mut state, now_ms);
        }
        PenaltySnapshot {
            penalty: state.penalty,
            last_reason: state.last_reason,
            reason_history: state.history.iter().copied().collect(),
            updated_at_ms: state.updated_at_ms,
        }
    }

    /// Resets the controller to zero penalty. Idempotent.
    pub fn reset_state(&self) {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("penalty state poisoned");
        state.penalty = 0.0;
        state.updated_at_ms = now_ms;
        state.last_reason = None;
        state.history.clear();
    }
}

impl std::fmt::Debug for PenaltyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PenaltyController")
            .field("stable", &self.config.stable)
            .field("penalty", &self.penalty())
            .finish()
    }
}

//! Penalty controller configuration.

use crate::controller::PenaltyReason;

/// How accumulated penalty decays over idle time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayStrategy {
    /// Subtract one per elapsed decay step.
    Linear,
    /// Multiply by `exponential_base` per elapsed decay step.
    Exponential,
    /// Exponential with base 0.7 while the penalty is above 5, linear below.
    Hybrid,
}

/// Per-reason penalty weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasonWeights {
    /// Weight for provider rate limiting. Default 2.0.
    pub rate_limit: f64,
    /// Weight for provider capacity exhaustion. Default 1.5.
    pub capacity: f64,
    /// Weight for timeouts. Default 1.0.
    pub timeout: f64,
    /// Weight for schema violations. Default 0.5.
    pub schema_violation: f64,
}

impl ReasonWeights {
    /// The weight for a given reason.
    pub fn weight(&self, reason: PenaltyReason) -> f64 {
        match reason {
            PenaltyReason::RateLimit => self.rate_limit,
            PenaltyReason::Capacity => self.capacity,
            PenaltyReason::Timeout => self.timeout,
            PenaltyReason::SchemaViolation => self.schema_violation,
        }
    }
}

impl Default for ReasonWeights {
    fn default() -> Self {
        Self {
            rate_limit: 2.0,
            capacity: 1.5,
            timeout: 1.0,
            schema_violation: 0.5,
        }
    }
}

/// Configuration for a [`crate::PenaltyController`].
#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    /// Stable profile: penalties pinned to zero. Default true.
    pub stable: bool,
    /// Penalty ceiling. Forced to 0.0 when `stable` is set.
    pub max_penalty: f64,
    /// Length of one decay step in milliseconds.
    pub decay_ms: u64,
    /// Decay shape.
    pub strategy: DecayStrategy,
    /// Per-step multiplier for exponential decay.
    pub exponential_base: f64,
    /// Per-reason raise amounts.
    pub weights: ReasonWeights,
    /// Bound on the retained reason history.
    pub history_cap: usize,
}

impl PenaltyConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PenaltyConfigBuilder {
        PenaltyConfigBuilder::new()
    }
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        PenaltyConfigBuilder::new().build()
    }
}

/// Builder for [`PenaltyConfig`].
#[derive(Debug, Clone)]
pub struct PenaltyConfigBuilder {
    stable: bool,
    max_penalty: f64,
    decay_ms: u64,
    strategy: DecayStrategy,
    exponential_base: f64,
    weights: ReasonWeights,
    history_cap: usize,
}

impl PenaltyConfigBuilder {
    /// Creates a builder with the production defaults (stable profile).
    pub fn new() -> Self {
        Self {
            stable: true,
            max_penalty: 10.0,
            decay_ms: 30_000,
            strategy: DecayStrategy::Exponential,
            exponential_base: 0.5,
            weights: ReasonWeights::default(),
            history_cap: 16,
        }
    }

    /// Toggles the stable profile. Default: true.
    ///
    /// When stable, `max_penalty` is forced to zero and the controller is a
    /// deterministic no-op. Non-stable operation is a development affordance.
    pub fn stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    /// Sets the penalty ceiling. Default: 10.0. Ignored when stable.
    pub fn max_penalty(mut self, max: f64) -> Self {
        self.max_penalty = max;
        self
    }

    /// Sets the decay step length. Default: 30 000 ms. Zero is coerced to 1.
    pub fn decay_ms(mut self, ms: u64) -> Self {
        self.decay_ms = ms;
        self
    }

    /// Sets the decay strategy. Default: exponential.
    pub fn decay_strategy(mut self, strategy: DecayStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the exponential decay base. Default: 0.5.
    pub fn exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Overrides the per-reason weights.
    pub fn weights(mut self, weights: ReasonWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the reason history bound. Default: 16.
    pub fn history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PenaltyConfig {
        PenaltyConfig {
            stable: self.stable,
            max_penalty: if self.stable { 0.0 } else { self.max_penalty },
            decay_ms: self.decay_ms.max(1),
            strategy: self.strategy,
            exponential_base: self.exponential_base,
            weights: self.weights,
            history_cap: self.history_cap.max(1),
        }
    }
}

impl Default for PenaltyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

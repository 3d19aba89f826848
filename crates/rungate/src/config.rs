//! Runtime configuration.
//!
//! All configuration is collected into an explicit [`RuntimeConfig`] at
//! construction time. The environment is read exactly once, in
//! [`RuntimeConfig::from_env`]; nothing in the runtime reads environment
//! variables at call sites.

use crate::checkpoint::DEFAULT_CHECKPOINT_TTL_MS;
use rungate_ledger::{CapacityLimits, LimitsError};
use rungate_penalty::{DecayStrategy, PenaltyConfig};
use rungate_scheduler::ScoreWeights;
use std::str::FromStr;

/// Which penalty controller behavior to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptivePenaltyMode {
    /// Linear decay, unweighted raises.
    Legacy,
    /// Exponential decay with weighted raise reasons.
    Enhanced,
}

impl FromStr for AdaptivePenaltyMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(AdaptivePenaltyMode::Legacy),
            "enhanced" => Ok(AdaptivePenaltyMode::Enhanced),
            _ => Err(()),
        }
    }
}

/// Errors rejected when building a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid capacity limits.
    #[error(transparent)]
    Limits(#[from] LimitsError),
    /// The queue must be able to hold at least one entry.
    #[error("queue_cap must be at least 1")]
    ZeroQueueCap,
    /// An environment override did not parse.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// The offending variable.
        var: String,
        /// The raw value.
        value: String,
    },
}

/// Complete, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Instance name used in events and logs.
    pub name: String,
    /// Capacity ceilings and wait/poll bounds.
    pub limits: CapacityLimits,
    /// Dequeue scoring weights.
    pub weights: ScoreWeights,
    /// Waiting-queue size cap.
    pub queue_cap: usize,
    /// Consecutive same-tenant dispatches before another tenant is preferred.
    pub anti_starvation_threshold: u32,
    /// Penalty controller behavior.
    pub penalty_mode: AdaptivePenaltyMode,
    /// Stable profile: adaptive behaviors disabled. Production default.
    pub stable_profile: bool,
    /// Whether higher-priority work may preempt running tasks.
    pub enable_preemption: bool,
    /// Penalty ceiling in non-stable operation.
    pub max_penalty: f64,
    /// Penalty decay step length.
    pub penalty_decay_ms: u64,
    /// TTL for dispatch-time reservations.
    pub reservation_ttl_ms: u64,
    /// TTL for preemption checkpoints.
    pub checkpoint_ttl_ms: u64,
    /// Whether the resource leak tracker is active.
    pub tracker_enabled: bool,
}

impl RuntimeConfig {
    /// Creates a builder seeded with defaults.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Builds a configuration from the environment.
    ///
    /// Recognized variables: `ADAPTIVE_PENALTY_MODE` (legacy|enhanced),
    /// `ENABLE_PREEMPTION`, `STABLE_RUNTIME_PROFILE`, and numeric overrides
    /// `MAX_TOTAL_ACTIVE_REQUESTS`, `MAX_TOTAL_ACTIVE_LLM`,
    /// `MAX_PARALLEL_SUBAGENTS_PER_RUN`, `MAX_PARALLEL_TEAMS_PER_RUN`,
    /// `MAX_PARALLEL_TEAM_MEMBERS_PER_TEAM`, `MAX_CONCURRENT_ORCHESTRATIONS`,
    /// `CAPACITY_WAIT_MS`, `CAPACITY_POLL_MS`, `QUEUE_CAP`,
    /// `ANTI_STARVATION_THRESHOLD`, `MAX_PENALTY`, `PENALTY_DECAY_MS`.
    pub fn from_env() -> Result<RuntimeConfig, ConfigError> {
        let mut builder = RuntimeConfigBuilder::new();

        let mut limits = CapacityLimits::builder();
        if let Some(v) = env_parse::<u32>("MAX_TOTAL_ACTIVE_REQUESTS")? {
            limits = limits.max_total_active_requests(v);
        }
        if let Some(v) = env_parse::<u32>("MAX_TOTAL_ACTIVE_LLM")? {
            limits = limits.max_total_active_llm(v);
        }
        if let Some(v) = env_parse::<u32>("MAX_PARALLEL_SUBAGENTS_PER_RUN")? {
            limits = limits.max_parallel_subagents_per_run(v);
        }
        if let Some(v) = env_parse::<u32>("MAX_PARALLEL_TEAMS_PER_RUN")? {
            limits = limits.max_parallel_teams_per_run(v);
        }
        if let Some(v) = env_parse::<u32>("MAX_PARALLEL_TEAM_MEMBERS_PER_TEAM")? {
            limits = limits.max_parallel_team_members_per_team(v);
        }
        if let Some(v) = env_parse::<u32>("MAX_CONCURRENT_ORCHESTRATIONS")? {
            limits = limits.max_concurrent_orchestrations(v);
        }
        if let Some(v) = env_parse::<u64>("CAPACITY_WAIT_MS")? {
            limits = limits.capacity_wait_ms(v);
        }
        if let Some(v) = env_parse::<u64>("CAPACITY_POLL_MS")? {
            limits = limits.capacity_poll_ms(v);
        }
        builder = builder.limits(limits.build()?);

        if let Some(v) = env_parse::<usize>("QUEUE_CAP")? {
            builder = builder.queue_cap(v);
        }
        if let Some(v) = env_parse::<u32>("ANTI_STARVATION_THRESHOLD")? {
            builder = builder.anti_starvation_threshold(v);
        }
        if let Some(v) = env_parse::<f64>("MAX_PENALTY")? {
            builder = builder.max_penalty(v);
        }
        if let Some(v) = env_parse::<u64>("PENALTY_DECAY_MS")? {
            builder = builder.penalty_decay_ms(v);
        }
        if let Some(v) = env_bool("ENABLE_PREEMPTION")? {
            builder = builder.enable_preemption(v);
        }
        if let Some(v) = env_bool("STABLE_RUNTIME_PROFILE")? {
            builder = builder.stable_profile(v);
        }
        if let Some(raw) = std::env::var("ADAPTIVE_PENALTY_MODE").ok().filter(|v| !v.is_empty()) {
            let mode = raw
                .parse::<AdaptivePenaltyMode>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "ADAPTIVE_PENALTY_MODE".to_string(),
                    value: raw,
                })?;
            builder = builder.penalty_mode(mode);
        }

        builder.build()
    }

    /// Maps this configuration onto the penalty controller's config.
    pub(crate) fn penalty_config(&self) -> PenaltyConfig {
        let strategy = match self.penalty_mode {
            AdaptivePenaltyMode::Legacy => DecayStrategy::Linear,
            AdaptivePenaltyMode::Enhanced => DecayStrategy::Exponential,
        };
        PenaltyConfig::builder()
            .stable(self.stable_profile)
            .max_penalty(self.max_penalty)
            .decay_ms(self.penalty_decay_ms)
            .decay_strategy(strategy)
            .build()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfigBuilder::new()
            .build()
            .expect("default config is valid")
    }
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
        _ => Ok(None),
    }
}

fn env_bool(var: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
        },
        _ => Ok(None),
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    name: String,
    limits: CapacityLimits,
    weights: ScoreWeights,
    queue_cap: usize,
    anti_starvation_threshold: u32,
    penalty_mode: AdaptivePenaltyMode,
    stable_profile: bool,
    enable_preemption: bool,
    max_penalty: f64,
    penalty_decay_ms: u64,
    reservation_ttl_ms: u64,
    checkpoint_ttl_ms: u64,
    tracker_enabled: bool,
}

impl RuntimeConfigBuilder {
    /// Creates a builder with the production defaults.
    pub fn new() -> Self {
        Self {
            name: "rungate".to_string(),
            limits: CapacityLimits::default(),
            weights: ScoreWeights::default(),
            queue_cap: 256,
            anti_starvation_threshold: 3,
            penalty_mode: AdaptivePenaltyMode::Enhanced,
            stable_profile: true,
            enable_preemption: true,
            max_penalty: 10.0,
            penalty_decay_ms: 30_000,
            reservation_ttl_ms: 30_000,
            checkpoint_ttl_ms: DEFAULT_CHECKPOINT_TTL_MS,
            tracker_enabled: true,
        }
    }

    /// Sets the instance name. Default: "rungate".
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity limits. Default: [`CapacityLimits::default`].
    pub fn limits(mut self, limits: CapacityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the scoring weights. Default: [`ScoreWeights::default`].
    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the queue size cap. Default: 256.
    pub fn queue_cap(mut self, cap: usize) -> Self {
        self.queue_cap = cap;
        self
    }

    /// Sets the anti-starvation threshold. Default: 3.
    pub fn anti_starvation_threshold(mut self, threshold: u32) -> Self {
        self.anti_starvation_threshold = threshold;
        self
    }

    /// Sets the penalty mode. Default: enhanced.
    pub fn penalty_mode(mut self, mode: AdaptivePenaltyMode) -> Self {
        self.penalty_mode = mode;
        self
    }

    /// Toggles the stable profile. Default: true.
    pub fn stable_profile(mut self, stable: bool) -> Self {
        self.stable_profile = stable;
        self
    }

    /// Toggles preemption. Default: true.
    pub fn enable_preemption(mut self, enabled: bool) -> Self {
        self.enable_preemption = enabled;
        self
    }

    /// Sets the penalty ceiling for non-stable operation. Default: 10.0.
    pub fn max_penalty(mut self, max: f64) -> Self {
        self.max_penalty = max;
        self
    }

    /// Sets the penalty decay step. Default: 30 000 ms.
    pub fn penalty_decay_ms(mut self, ms: u64) -> Self {
        self.penalty_decay_ms = ms;
        self
    }

    /// Sets the reservation TTL. Default: 30 000 ms.
    pub fn reservation_ttl_ms(mut self, ms: u64) -> Self {
        self.reservation_ttl_ms = ms;
        self
    }

    /// Sets the checkpoint TTL. Default: 24 hours.
    pub fn checkpoint_ttl_ms(mut self, ms: u64) -> Self {
        self.checkpoint_ttl_ms = ms;
        self
    }

    /// Toggles the leak tracker. Default: true.
    pub fn tracker_enabled(mut self, enabled: bool) -> Self {
        self.tracker_enabled = enabled;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        if self.queue_cap == 0 {
            return Err(ConfigError::ZeroQueueCap);
        }
        Ok(RuntimeConfig {
            name: self.name,
            limits: self.limits,
            weights: self.weights,
            queue_cap: self.queue_cap,
            anti_starvation_threshold: self.anti_starvation_threshold,
            penalty_mode: self.penalty_mode,
            stable_profile: self.stable_profile,
            enable_preemption: self.enable_preemption,
            max_penalty: self.max_penalty,
            penalty_decay_ms: self.penalty_decay_ms,
            reservation_ttl_ms: self.reservation_ttl_ms,
            checkpoint_ttl_ms: self.checkpoint_ttl_ms,
            tracker_enabled: self.tracker_enabled,
        })
    }
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

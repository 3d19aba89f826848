//! Configurable capacity limits.

use std::fmt;

/// Declared ceilings for the runtime's resource pools.
///
/// Limits are immutable once built. [`CapacityLimits::version`] returns a
/// stable hash over the numeric fields so consumers holding a snapshot can
/// detect that the runtime was reconfigured underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityLimits {
    /// Maximum total in-flight provider requests (subagent runs + team runs).
    pub max_total_active_requests: u32,
    /// Maximum total active LLM slots (subagents + teammates).
    pub max_total_active_llm: u32,
    /// Maximum parallel subagents per owning run.
    pub max_parallel_subagents_per_run: u32,
    /// Maximum parallel teams per owning run.
    pub max_parallel_teams_per_run: u32,
    /// Maximum parallel members per team.
    pub max_parallel_team_members_per_team: u32,
    /// Maximum concurrent dispatch walks over the waiting queue.
    pub max_concurrent_orchestrations: u32,
    /// Default ceiling on how long a caller waits for capacity.
    pub capacity_wait_ms: u64,
    /// Fallback poll interval between dispatch signals. Must be >= 1.
    pub capacity_poll_ms: u64,
}

/// Errors rejected at the configuration boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitsError {
    /// The poll interval would spin.
    #[error("capacity_poll_ms must be at least 1, got {0}")]
    ZeroPollInterval(u64),
    /// Without at least one orchestration slot the queue never drains.
    #[error("max_concurrent_orchestrations must be at least 1, got {0}")]
    ZeroOrchestrations(u32),
}

impl CapacityLimits {
    /// Creates a builder seeded with the defaults.
    pub fn builder() -> CapacityLimitsBuilder {
        CapacityLimitsBuilder::new()
    }

    /// Stable version string for this set of limits.
    ///
    /// FNV-1a over a canonical rendering of every numeric field; two equal
    /// limit sets always produce the same version, across processes.
    pub fn version(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.max_total_active_requests,
            self.max_total_active_llm,
            self.max_parallel_subagents_per_run,
            self.max_parallel_teams_per_run,
            self.max_parallel_team_members_per_team,
            self.max_concurrent_orchestrations,
            self.capacity_wait_ms,
            self.capacity_poll_ms,
        );
        format!("{:016x}", fnv1a64(canonical.as_bytes()))
    }
}

impl Default for CapacityLimits {
    fn default() -> Self {
        // Builder defaults are always valid.
        CapacityLimitsBuilder::new()
            .build()
            .expect("default limits are valid")
    }
}

impl fmt::Display for CapacityLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} llm={} version={}",
            self.max_total_active_requests,
            self.max_total_active_llm,
            self.version()
        )
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Builder for [`CapacityLimits`].
#[derive(Debug, Clone)]
pub struct CapacityLimitsBuilder {
    max_total_active_requests: u32,
    max_total_active_llm: u32,
    max_parallel_subagents_per_run: u32,
    max_parallel_teams_per_run: u32,
    max_parallel_team_members_per_team: u32,
    max_concurrent_orchestrations: u32,
    capacity_wait_ms: u64,
    capacity_poll_ms: u64,
}

impl CapacityLimitsBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_total_active_requests: 10,
            max_total_active_llm: 20,
            max_parallel_subagents_per_run: 5,
            max_parallel_teams_per_run: 3,
            max_parallel_team_members_per_team: 5,
            max_concurrent_orchestrations: 2,
            capacity_wait_ms: 60_000,
            capacity_poll_ms: 100,
        }
    }

    /// Sets the maximum total in-flight requests. Default: 10.
    pub fn max_total_active_requests(mut self, max: u32) -> Self {
        self.max_total_active_requests = max;
        self
    }

    /// Sets the maximum total active LLM slots. Default: 20.
    pub fn max_total_active_llm(mut self, max: u32) -> Self {
        self.max_total_active_llm = max;
        self
    }

    /// Sets the maximum parallel subagents per owning run. Default: 5.
    pub fn max_parallel_subagents_per_run(mut self, max: u32) -> Self {
        self.max_parallel_subagents_per_run = max;
        self
    }

    /// Sets the maximum parallel teams per owning run. Default: 3.
    pub fn max_parallel_teams_per_run(mut self, max: u32) -> Self {
        self.max_parallel_teams_per_run = max;
        self
    }

    /// Sets the maximum parallel members per team. Default: 5.
    pub fn max_parallel_team_members_per_team(mut self, max: u32) -> Self {
        self.max_parallel_team_members_per_team = max;
        self
    }

    /// Sets the maximum concurrent dispatch walks. Default: 2.
    pub fn max_concurrent_orchestrations(mut self, max: u32) -> Self {
        self.max_concurrent_orchestrations = max;
        self
    }

    /// Sets the default capacity wait ceiling. Default: 60 000 ms.
    pub fn capacity_wait_ms(mut self, ms: u64) -> Self {
        self.capacity_wait_ms = ms;
        self
    }

    /// Sets the fallback poll interval. Default: 100 ms.
    pub fn capacity_poll_ms(mut self, ms: u64) -> Self {
        self.capacity_poll_ms = ms;
        self
    }

    /// Validates and builds the limits.
    pub fn build(self) -> Result<CapacityLimits, LimitsError> {
        if self.capacity_poll_ms == 0 {
            return Err(LimitsError::ZeroPollInterval(self.capacity_poll_ms));
        }
        if self.max_concurrent_orchestrations == 0 {
            return Err(LimitsError::ZeroOrchestrations(
                self.max_concurrent_orchestrations,
            ));
        }
        Ok(CapacityLimits {
            max_total_active_requests: self.max_total_active_requests,
            max_total_active_llm: self.max_total_active_llm,
            max_parallel_subagents_per_run: self.max_parallel_subagents_per_run,
            max_parallel_teams_per_run: self.max_parallel_teams_per_run,
            max_parallel_team_members_per_team: self.max_parallel_team_members_per_team,
            max_concurrent_orchestrations: self.max_concurrent_orchestrations,
            capacity_wait_ms: self.capacity_wait_ms,
            capacity_poll_ms: self.capacity_poll_ms,
        })
    }
}

impl Default for CapacityLimitsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

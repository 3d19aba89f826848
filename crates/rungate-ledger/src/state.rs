//! Counter families and snapshots.

/// Counters for directly launched subagent work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubagentCounters {
    /// In-flight subagent run requests.
    pub active_run_requests: u32,
    /// Active subagent LLM slots.
    pub active_agents: u32,
}

/// Counters for agent-team work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamCounters {
    /// In-flight team runs.
    pub active_team_runs: u32,
    /// Active teammate LLM slots.
    pub active_teammates: u32,
}

/// Consistent point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Subagent counter family.
    pub subagents: SubagentCounters,
    /// Team counter family.
    pub teams: TeamCounters,
    /// `subagents.active_run_requests + teams.active_team_runs`.
    pub total_active_requests: u32,
    /// `subagents.active_agents + teams.active_teammates`.
    pub total_active_llm: u32,
    /// Reservations that have not yet been consumed or swept.
    pub pending_reservations: usize,
    /// Request units held by pending reservations.
    pub reserved_requests: u32,
    /// LLM units held by pending reservations.
    pub reserved_llm: u32,
    /// Version of the limits this snapshot was taken against.
    pub limits_version: String,
}

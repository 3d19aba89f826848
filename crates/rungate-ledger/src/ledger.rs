//! The capacity ledger: atomic check-and-reserve over slot counters.

use crate::events::LedgerEvent;
use crate::limits::CapacityLimits;
use crate::reservation::ReservationLease;
use crate::state::{LedgerSnapshot, SubagentCounters, TeamCounters};
use rungate_core::clock::{Clock, SystemClock};
use rungate_core::hooks::Hooks;
use std::sync::{Arc, Mutex};

/// Which counter family a dispatched task draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Directly launched subagents (`active_run_requests` / `active_agents`).
    Subagent,
    /// Agent teams (`active_team_runs` / `active_teammates`).
    Team,
}

/// Result of a non-reserving capacity probe.
#[derive(Debug, Clone)]
pub struct CapacityCheck {
    /// Whether the additional demand fits under every limit.
    pub allowed: bool,
    /// Human-readable reasons when not allowed.
    pub reasons: Vec<String>,
    /// Active + reserved + additional request units.
    pub projected_requests: u32,
    /// Active + reserved + additional LLM units.
    pub projected_llm: u32,
}

#[derive(Debug)]
pub(crate) struct ReservationRecord {
    pub(crate) id: u64,
    pub(crate) tool: String,
    pub(crate) additional_requests: u32,
    pub(crate) additional_llm: u32,
    pub(crate) created_at_ms: u64,
    pub(crate) heartbeat_at_ms: u64,
    pub(crate) expires_at_ms: u64,
    pub(crate) ttl_ms: u64,
    pub(crate) consumed: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    subagents: SubagentCounters,
    teams: TeamCounters,
    reservations: Vec<ReservationRecord>,
    next_reservation_id: u64,
}

impl LedgerState {
    fn total_active_requests(&self) -> u32 {
        self.subagents.active_run_requests + self.teams.active_team_runs
    }

    fn total_active_llm(&self) -> u32 {
        self.subagents.active_agents + self.teams.active_teammates
    }

    fn reserved_requests(&self) -> u32 {
        self.reservations
            .iter()
            .filter(|r| !r.consumed)
            .map(|r| r.additional_requests)
            .fold(0u32, u32::saturating_add)
    }

    fn reserved_llm(&self) -> u32 {
        self.reservations
            .iter()
            .filter(|r| !r.consumed)
            .map(|r| r.additional_llm)
            .fold(0u32, u32::saturating_add)
    }
}

pub(crate) struct LedgerShared {
    name: String,
    limits: CapacityLimits,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
    hooks: Hooks<LedgerEvent>,
}

impl LedgerShared {
    /// Removes expired, unconsumed reservations. Returns the removed records
    /// so the caller can emit events after dropping the lock.
    fn sweep_locked(&self, state: &mut LedgerState, now_ms: u64) -> Vec<ReservationRecord> {
        let mut expired = Vec::new();
        state.reservations.retain_mut(|r| {
            if !r.consumed && r.expires_at_ms <= now_ms {
                expired.push(ReservationRecord {
                    id: r.id,
                    tool: std::mem::take(&mut r.tool),
                    additional_requests: r.additional_requests,
                    additional_llm: r.additional_llm,
                    created_at_ms: r.created_at_ms,
                    heartbeat_at_ms: r.heartbeat_at_ms,
                    expires_at_ms: r.expires_at_ms,
                    ttl_ms: r.ttl_ms,
                    consumed: r.consumed,
                });
                false
            } else {
                true
            }
        });
        expired
    }

    fn emit_expired(&self, expired: Vec<ReservationRecord>) {
        for record in expired {
            #[cfg(feature = "metrics")]
            metrics::counter!("rungate_reservations_expired_total").increment(1);

            self.hooks.fire(&LedgerEvent::ReservationExpired {
                reservation_id: record.id,
                tool: record.tool,
            });
        }
    }

    fn check_locked(&self, state: &LedgerState, add_req: u32, add_llm: u32) -> CapacityCheck {
        let projected_requests = state
            .total_active_requests()
            .saturating_add(state.reserved_requests())
            .saturating_add(add_req);
        let projected_llm = state
            .total_active_llm()
            .saturating_add(state.reserved_llm())
            .saturating_add(add_llm);

        let mut reasons = Vec::new();
        if projected_requests > self.limits.max_total_active_requests {
            reasons.push(format!(
                "projected requests {} exceed limit {}",
                projected_requests, self.limits.max_total_active_requests
            ));
        }
        if projected_llm > self.limits.max_total_active_llm {
            reasons.push(format!(
                "projected llm {} exceed limit {}",
                projected_llm, self.limits.max_total_active_llm
            ));
        }

        CapacityCheck {
            allowed: reasons.is_empty(),
            reasons,
            projected_requests,
            projected_llm,
        }
    }

    fn insert_reservation(
        &self,
        state: &mut LedgerState,
        tool: &str,
        add_req: u32,
        add_llm: u32,
        ttl_ms: u64,
        consumed: bool,
        now_ms: u64,
    ) -> u64 {
        state.next_reservation_id += 1;
        let id = state.next_reservation_id;
        state.reservations.push(ReservationRecord {
            id,
            tool: tool.to_string(),
            additional_requests: add_req,
            additional_llm: add_llm,
            created_at_ms: now_ms,
            heartbeat_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
            ttl_ms,
            consumed,
        });
        id
    }

    fn consume_locked(&self, state: &mut LedgerState, kind: SlotKind, add_req: u32, add_llm: u32) {
        match kind {
            SlotKind::Subagent => {
                state.subagents.active_run_requests =
                    state.subagents.active_run_requests.saturating_add(add_req);
                state.subagents.active_agents =
                    state.subagents.active_agents.saturating_add(add_llm);
            }
            SlotKind::Team => {
                state.teams.active_team_runs = state.teams.active_team_runs.saturating_add(add_req);
                state.teams.active_teammates =
                    state.teams.active_teammates.saturating_add(add_llm);
            }
        }
    }

    pub(crate) fn release_reservation(&self, id: u64) -> bool {
        let removed = {
            let mut state = self.state.lock().expect("ledger state poisoned");
            let before = state.reservations.len();
            state.reservations.retain(|r| r.id != id);
            state.reservations.len() != before
        };
        if removed {
            self.hooks
                .fire(&LedgerEvent::ReservationReleased { reservation_id: id });
        }
        removed
    }

    pub(crate) fn mark_consumed(&self, id: u64) -> bool {
        let mut state = self.state.lock().expect("ledger state poisoned");
        match state.reservations.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.consumed = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn heartbeat_reservation(&self, id: u64, ttl_override_ms: Option<u64>) -> bool {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("ledger state poisoned");
        match state.reservations.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                let ttl = ttl_override_ms.unwrap_or(record.ttl_ms);
                record.heartbeat_at_ms = now_ms;
                record.expires_at_ms = now_ms.saturating_add(ttl);
                true
            }
            None => false,
        }
    }
}

/// In-memory capacity ledger.
///
/// All mutation is serialized behind a single mutex; every operation is
/// bounded work and never suspends. Clones share the same state.
#[derive(Clone)]
pub struct CapacityLedger {
    shared: Arc<LedgerShared>,
}

impl CapacityLedger {
    /// Creates a builder for a ledger with the given limits.
    pub fn builder(limits: CapacityLimits) -> CapacityLedgerBuilder {
        CapacityLedgerBuilder::new(limits)
    }

    /// The limits this ledger enforces.
    pub fn limits(&self) -> &CapacityLimits {
        &self.shared.limits
    }

    /// Returns a consistent read of all counters.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let now_ms = self.shared.clock.now_ms();
        let (snapshot, expired) = {
            let mut state = self.shared.state.lock().expect("ledger state poisoned");
            let expired = self.shared.sweep_locked(&mut state, now_ms);
            let snapshot = LedgerSnapshot {
                subagents: state.subagents,
                teams: state.teams,
                total_active_requests: state.total_active_requests(),
                total_active_llm: state.total_active_llm(),
                pending_reservations: state.reservations.iter().filter(|r| !r.consumed).count(),
                reserved_requests: state.reserved_requests(),
                reserved_llm: state.reserved_llm(),
                limits_version: self.shared.limits.version(),
            };
            (snapshot, expired)
        };
        self.shared.emit_expired(expired);
        snapshot
    }

    /// Non-reserving probe: would `add_req`/`add_llm` more units fit?
    ///
    /// The projection counts active slots, pending (unconsumed) reservations,
    /// and the additional demand.
    pub fn check_capacity(&self, add_req: u32, add_llm: u32) -> CapacityCheck {
        let now_ms = self.shared.clock.now_ms();
        let (check, expired) = {
            let mut state = self.shared.state.lock().expect("ledger state poisoned");
            let expired = self.shared.sweep_locked(&mut state, now_ms);
            (self.shared.check_locked(&state, add_req, add_llm), expired)
        };
        self.shared.emit_expired(expired);
        check
    }

    /// Atomically increments the counter pair for `kind`.
    pub fn consume_slots(&self, kind: SlotKind, add_req: u32, add_llm: u32) {
        let mut state = self.shared.state.lock().expect("ledger state poisoned");
        self.shared.consume_locked(&mut state, kind, add_req, add_llm);
    }

    /// Atomically decrements the counter pair for `kind`, clamping at zero.
    pub fn release_slots(&self, kind: SlotKind, add_req: u32, add_llm: u32) {
        let mut state = self.shared.state.lock().expect("ledger state poisoned");
        match kind {
            SlotKind::Subagent => {
                state.subagents.active_run_requests =
                    state.subagents.active_run_requests.saturating_sub(add_req);
                state.subagents.active_agents =
                    state.subagents.active_agents.saturating_sub(add_llm);
            }
            SlotKind::Team => {
                state.teams.active_team_runs = state.teams.active_team_runs.saturating_sub(add_req);
                state.teams.active_teammates =
                    state.teams.active_teammates.saturating_sub(add_llm);
            }
        }
    }

    /// Grants a TTL-bounded reservation, or `None` when capacity is short.
    pub fn reserve(
        &self,
        tool: &str,
        add_req: u32,
        add_llm: u32,
        ttl_ms: u64,
    ) -> Option<ReservationLease> {
        self.reserve_inner(tool, None, add_req, add_llm, ttl_ms)
    }

    /// Dispatch-time compound operation: checks capacity, records the
    /// reservation as already consumed, and bumps the real slot counters, all
    /// under one lock acquisition so no observer can see an intermediate
    /// state.
    pub fn reserve_and_consume(
        &self,
        tool: &str,
        kind: SlotKind,
        add_req: u32,
        add_llm: u32,
        ttl_ms: u64,
    ) -> Option<ReservationLease> {
        self.reserve_inner(tool, Some(kind), add_req, add_llm, ttl_ms)
    }

    fn reserve_inner(
        &self,
        tool: &str,
        consume_kind: Option<SlotKind>,
        add_req: u32,
        add_llm: u32,
        ttl_ms: u64,
    ) -> Option<ReservationLease> {
        let now_ms = self.shared.clock.now_ms();
        let (granted, expired) = {
            let mut state = self.shared.state.lock().expect("ledger state poisoned");
            let expired = self.shared.sweep_locked(&mut state, now_ms);
            let check = self.shared.check_locked(&state, add_req, add_llm);
            if !check.allowed {
                (None, expired)
            } else {
                let id = self.shared.insert_reservation(
                    &mut state,
                    tool,
                    add_req,
                    add_llm,
                    ttl_ms,
                    consume_kind.is_some(),
                    now_ms,
                );
                if let Some(kind) = consume_kind {
                    self.shared.consume_locked(&mut state, kind, add_req, add_llm);
                }
                (Some(id), expired)
            }
        };
        self.shared.emit_expired(expired);

        let id = granted?;
        self.shared.hooks.fire(&LedgerEvent::ReservationGranted {
            reservation_id: id,
            tool: tool.to_string(),
        });
        Some(ReservationLease::new(
            Arc::clone(&self.shared),
            id,
            tool.to_string(),
            add_req,
            add_llm,
        ))
    }

    /// Explicit expiry sweep; also runs opportunistically on every operation.
    /// Returns how many reservations were reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.shared.clock.now_ms();
        let expired = {
            let mut state = self.shared.state.lock().expect("ledger state poisoned");
            self.shared.sweep_locked(&mut state, now_ms)
        };
        let count = expired.len();
        self.shared.emit_expired(expired);
        count
    }
}

impl std::fmt::Debug for CapacityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CapacityLedger")
            .field("name", &self.shared.name)
            .field("active_requests", &snapshot.total_active_requests)
            .field("active_llm", &snapshot.total_active_llm)
            .field("pending_reservations", &snapshot.pending_reservations)
            .finish()
    }
}

/// Builder for [`CapacityLedger`].
pub struct CapacityLedgerBuilder {
    limits: CapacityLimits,
    name: String,
    clock: Arc<dyn Clock>,
    hooks: Hooks<LedgerEvent>,
}

impl CapacityLedgerBuilder {
    fn new(limits: CapacityLimits) -> Self {
        Self {
            limits,
            name: "ledger".to_string(),
            clock: Arc::new(SystemClock::new()),
            hooks: Hooks::new(),
        }
    }

    /// Sets the instance name. Default: "ledger".
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the clock. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a callback invoked when a reservation expires unconsumed.
    pub fn on_reservation_expired<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let LedgerEvent::ReservationExpired { reservation_id, .. } = event {
                f(*reservation_id);
            }
        });
        self
    }

    /// Registers a callback invoked when a reservation is granted.
    pub fn on_reservation_granted<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let LedgerEvent::ReservationGranted { reservation_id, .. } = event {
                f(*reservation_id);
            }
        });
        self
    }

    /// Builds the ledger.
    pub fn build(self) -> CapacityLedger {
        CapacityLedger {
            shared: Arc::new(LedgerShared {
                name: self.name,
                limits: self.limits,
                clock: self.clock,
                state: Mutex::new(LedgerState::default()),
                hooks: self.hooks,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rungate_core::clock::ManualClock;

    fn small_limits() -> CapacityLimits {
        CapacityLimits::builder()
            .max_total_active_requests(2)
            .max_total_active_llm(4)
            .build()
            .unwrap()
    }

    #[test]
    fn check_capacity_projects_active_and_reserved() {
        let ledger = CapacityLedger::builder(small_limits()).build();

        let check = ledger.check_capacity(1, 1);
        assert!(check.allowed);
        assert_eq!(check.projected_requests, 1);

        ledger.consume_slots(SlotKind::Subagent, 1, 1);
        let _lease = ledger.reserve("t", 1, 1, 10_000).expect("fits");

        let check = ledger.check_capacity(1, 1);
        assert!(!check.allowed);
        assert_eq!(check.projected_requests, 3);
        assert!(check.reasons[0].contains("exceed limit 2"));
    }

    #[test]
    fn reserve_fails_when_over_limit() {
        let ledger = CapacityLedger::builder(small_limits()).build();
        let _a = ledger.reserve("a", 1, 1, 10_000).expect("first fits");
        let _b = ledger.reserve("b", 1, 1, 10_000).expect("second fits");
        assert!(ledger.reserve("c", 1, 1, 10_000).is_none());
    }

    #[test]
    fn release_returns_ledger_to_prior_state() {
        let ledger = CapacityLedger::builder(small_limits()).build();
        let before = ledger.snapshot();

        let lease = ledger.reserve("t", 1, 2, 10_000).expect("fits");
        lease.consume();
        lease.release();

        let after = ledger.snapshot();
        assert_eq!(before, after);
    }

    #[test]
    fn release_is_idempotent() {
        let ledger = CapacityLedger::builder(small_limits()).build();
        let lease = ledger.reserve("t", 1, 1, 10_000).expect("fits");
        lease.release();
        lease.release();
        assert_eq!(ledger.snapshot().pending_reservations, 0);
    }

    #[test]
    fn expired_reservations_are_swept() {
        let clock = ManualClock::shared(0);
        let ledger = CapacityLedger::builder(small_limits())
            .clock(clock.clone())
            .build();

        let lease = ledger.reserve("t", 2, 2, 1_000).expect("fits");
        assert!(!ledger.check_capacity(1, 1).allowed);

        clock.advance(1_001);
        let check = ledger.check_capacity(1, 1);
        assert!(check.allowed, "expired reservation should free headroom");

        // releasing the stale lease is a no-op
        lease.release();
    }

    #[test]
    fn heartbeat_extends_expiry() {
        let clock = ManualClock::shared(0);
        let ledger = CapacityLedger::builder(small_limits())
            .clock(clock.clone())
            .build();

        let lease = ledger.reserve("t", 1, 1, 1_000).expect("fits");
        clock.advance(800);
        assert!(lease.heartbeat(None));
        clock.advance(800);

        // without the heartbeat this would have expired at t=1000
        assert_eq!(ledger.snapshot().pending_reservations, 1);
        lease.release();
    }

    #[test]
    fn consumed_reservation_stops_counting_toward_projection() {
        let ledger = CapacityLedger::builder(small_limits()).build();
        let lease = ledger
            .reserve_and_consume("t", SlotKind::Subagent, 1, 1, 10_000)
            .expect("fits");

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.total_active_requests, 1);
        assert_eq!(snapshot.reserved_requests, 0);

        // demand is represented once, by the active counters
        let check = ledger.check_capacity(1, 1);
        assert!(check.allowed);
        assert_eq!(check.projected_requests, 2);

        ledger.release_slots(SlotKind::Subagent, 1, 1);
        lease.release();
        assert_eq!(ledger.snapshot().total_active_requests, 0);
    }

    #[test]
    fn release_slots_clamps_at_zero() {
        let ledger = CapacityLedger::builder(small_limits()).build();
        ledger.release_slots(SlotKind::Team, 5, 5);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.teams.active_team_runs, 0);
        assert_eq!(snapshot.teams.active_teammates, 0);
    }

    #[test]
    fn totals_sum_both_families() {
        let ledger = CapacityLedger::builder(
            CapacityLimits::builder()
                .max_total_active_requests(10)
                .max_total_active_llm(10)
                .build()
                .unwrap(),
        )
        .build();
        ledger.consume_slots(SlotKind::Subagent, 1, 2);
        ledger.consume_slots(SlotKind::Team, 3, 4);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.total_active_requests, 4);
        assert_eq!(snapshot.total_active_llm, 6);
    }

    #[test]
    fn expiry_event_fires() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let expired = Arc::new(AtomicUsize::new(0));
        let expired_clone = Arc::clone(&expired);

        let clock = ManualClock::shared(0);
        let ledger = CapacityLedger::builder(small_limits())
            .clock(clock.clone())
            .on_reservation_expired(move |_| {
                expired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let _lease = ledger.reserve("t", 1, 1, 500).expect("fits");
        clock.advance(501);
        assert_eq!(ledger.sweep_expired(), 1);
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }
}

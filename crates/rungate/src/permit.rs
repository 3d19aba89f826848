//! The dispatch permit surface: requests, results, and held leases.

use crate::runtime::{pump, RuntimeInner};
use rungate_ledger::{ReservationLease, SlotKind};
use rungate_scheduler::{ResourceCost, TaskDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A request for permission to run.
#[derive(Debug)]
pub struct PermitRequest {
    /// The task seeking admission.
    pub task: TaskDescriptor,
    /// Counter family the task draws from. Default: subagent.
    pub slot_kind: SlotKind,
    /// Wait ceiling override; defaults to the configured `capacity_wait_ms`.
    pub max_wait_ms: Option<u64>,
}

impl PermitRequest {
    /// Creates a subagent-slot request with the default wait bound.
    pub fn new(task: TaskDescriptor) -> Self {
        Self {
            task,
            slot_kind: SlotKind::Subagent,
            max_wait_ms: None,
        }
    }

    /// Draws from the team counter family instead.
    pub fn team(mut self) -> Self {
        self.slot_kind = SlotKind::Team;
        self
    }

    /// Sets the slot kind explicitly.
    pub fn slot_kind(mut self, kind: SlotKind) -> Self {
        self.slot_kind = kind;
        self
    }

    /// Overrides the maximum wait for capacity.
    pub fn max_wait_ms(mut self, ms: u64) -> Self {
        self.max_wait_ms = Some(ms);
        self
    }
}

/// Outcome of [`crate::Runtime::acquire_permit`].
///
/// Expected failures (timeout, abort, eviction) are values, not errors.
#[derive(Debug)]
pub struct PermitResult {
    /// Whether the task may run. When true, `lease` is present.
    pub allowed: bool,
    /// The held lease; release it when the work finishes.
    pub lease: Option<PermitLease>,
    /// Denial reasons, when not allowed.
    pub reasons: Vec<String>,
    /// How long the caller waited.
    pub waited_ms: u64,
    /// The wait bound elapsed before capacity freed up.
    pub timed_out: bool,
    /// The abort signal fired while waiting.
    pub aborted: bool,
}

impl PermitResult {
    pub(crate) fn allowed(lease: PermitLease, waited_ms: u64) -> Self {
        Self {
            allowed: true,
            lease: Some(lease),
            reasons: Vec::new(),
            waited_ms,
            timed_out: false,
            aborted: false,
        }
    }

    pub(crate) fn denied(reasons: Vec<String>, waited_ms: u64) -> Self {
        Self {
            allowed: false,
            lease: None,
            reasons,
            waited_ms,
            timed_out: false,
            aborted: false,
        }
    }

    pub(crate) fn timed_out(waited_ms: u64) -> Self {
        Self {
            allowed: false,
            lease: None,
            reasons: vec!["timed_out".to_string()],
            waited_ms,
            timed_out: true,
            aborted: false,
        }
    }

    pub(crate) fn aborted(waited_ms: u64) -> Self {
        Self {
            allowed: false,
            lease: None,
            reasons: vec!["aborted".to_string()],
            waited_ms,
            timed_out: false,
            aborted: true,
        }
    }

    /// Whether the permit was granted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Takes the lease out of the result.
    pub fn into_lease(self) -> Option<PermitLease> {
        self.lease
    }
}

/// A granted permit holding real slot capacity.
///
/// Call [`release`](PermitLease::release) when the work finishes; dropping
/// the lease releases as a safety net, so an early return cannot strand
/// slots. The leak tracker flags leases held open suspiciously long.
pub struct PermitLease {
    inner: Arc<RuntimeInner>,
    task_id: String,
    slot_kind: SlotKind,
    cost: ResourceCost,
    reservation: ReservationLease,
    tracker_id: u64,
    released: AtomicBool,
}

impl PermitLease {
    pub(crate) fn new(
        inner: Arc<RuntimeInner>,
        task_id: String,
        slot_kind: SlotKind,
        cost: ResourceCost,
        reservation: ReservationLease,
        tracker_id: u64,
    ) -> Self {
        Self {
            inner,
            task_id,
            slot_kind,
            cost,
            reservation,
            tracker_id,
            released: AtomicBool::new(false),
        }
    }

    /// The task this lease admits.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// The underlying reservation id.
    pub fn reservation_id(&self) -> u64 {
        self.reservation.id()
    }

    /// Which counter family the lease holds.
    pub fn slot_kind(&self) -> SlotKind {
        self.slot_kind
    }

    /// Informational hint that the task has begun drawing real resources.
    /// Idempotent; the slot counters were already committed at dispatch.
    pub fn consume(&self) {
        self.reservation.consume();
    }

    /// Returns the held slots to the pool, deregisters the execution, and
    /// wakes the dispatcher to consider the next queued entry. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.ledger.release_slots(
            self.slot_kind,
            self.cost.additional_requests,
            self.cost.additional_llm,
        );
        self.reservation.release();
        {
            let mut sched = self.inner.sched.lock().expect("scheduler state poisoned");
            sched.active.remove(&self.task_id);
        }
        // a preempted execution was already deregistered; the tracker entry
        // is still ours to close
        let _ = self.inner.tracker.release(self.tracker_id);

        #[cfg(feature = "metrics")]
        metrics::counter!("rungate_permits_released_total").increment(1);

        pump(&self.inner);
    }

    /// Whether `release` has been called on this lease.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for PermitLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PermitLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitLease")
            .field("task_id", &self.task_id)
            .field("slot_kind", &self.slot_kind)
            .field("cost", &self.cost)
            .field("released", &self.is_released())
            .finish()
    }
}

//! Reservation leases.

use crate::ledger::LedgerShared;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A TTL-bounded grant of resource units against the ledger.
///
/// A reservation holds headroom without drawing real slots. The holder must
/// either [`release`](ReservationLease::release) it or keep it alive with
/// [`heartbeat`](ReservationLease::heartbeat); otherwise the expiry sweep
/// reclaims it. [`consume`](ReservationLease::consume) is a hint that the
/// task has begun drawing real resources — the slot counters themselves are
/// bumped by the dispatch layer, not by the lease.
pub struct ReservationLease {
    shared: Arc<LedgerShared>,
    id: u64,
    tool: String,
    additional_requests: u32,
    additional_llm: u32,
    released: AtomicBool,
}

impl ReservationLease {
    pub(crate) fn new(
        shared: Arc<LedgerShared>,
        id: u64,
        tool: String,
        additional_requests: u32,
        additional_llm: u32,
    ) -> Self {
        Self {
            shared,
            id,
            tool,
            additional_requests,
            additional_llm,
            released: AtomicBool::new(false),
        }
    }

    /// Ledger-assigned reservation id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tool that requested the reservation.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Request units held.
    pub fn additional_requests(&self) -> u32 {
        self.additional_requests
    }

    /// LLM units held.
    pub fn additional_llm(&self) -> u32 {
        self.additional_llm
    }

    /// Marks the reservation as consumed. Idempotent; no counter change.
    ///
    /// A consumed reservation stops counting toward capacity projections
    /// (its demand is represented by the real slot counters the dispatch
    /// layer bumps) and is no longer subject to TTL expiry.
    pub fn consume(&self) {
        self.shared.mark_consumed(self.id);
    }

    /// Extends the reservation's expiry. Returns false if the reservation is
    /// already gone (released or swept). `ttl_override_ms` replaces the
    /// original TTL for this extension when given.
    pub fn heartbeat(&self, ttl_override_ms: Option<u64>) -> bool {
        self.shared.heartbeat_reservation(self.id, ttl_override_ms)
    }

    /// Releases the reservation, returning its units to the pool.
    /// Idempotent: the second and later calls are no-ops.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.release_reservation(self.id);
    }

    /// Whether `release` has been called on this handle.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ReservationLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationLease")
            .field("id", &self.id)
            .field("tool", &self.tool)
            .field("additional_requests", &self.additional_requests)
            .field("additional_llm", &self.additional_llm)
            .field("released", &self.is_released())
            .finish()
    }
}

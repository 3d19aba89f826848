//! Leak detection for open-close resources.
//!
//! Anything with an open/close lifecycle (permit leases, reservations, file
//! handles) can be registered here. Resources that are never released show
//! up in [`ResourceTracker::leaks`] and in the shutdown summary.

use rungate_core::clock::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Minimum age for a resource to count as leaked in the shutdown summary.
pub const SHUTDOWN_LEAK_AGE_MS: u64 = 1_000;

/// A resource currently tracked as open.
#[derive(Debug, Clone)]
pub struct TrackedResource {
    /// Tracker-assigned id.
    pub id: u64,
    /// Resource kind, e.g. "permit-lease".
    pub kind: String,
    /// Free-form annotation (task id, file path).
    pub metadata: Option<String>,
    /// When the resource was opened.
    pub opened_at_ms: u64,
}

/// Errors from the tracker.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    /// Release of an id that is not open: double release or never tracked.
    #[error("resource {0} is not tracked (double release?)")]
    UnknownResource(u64),
}

#[derive(Default)]
struct TrackerState {
    next_id: u64,
    open: HashMap<u64, TrackedResource>,
}

/// Diagnostic registry of open resources.
///
/// When disabled, `track` returns the sentinel id 0 and every other
/// operation is a no-op, so call sites need no branching.
pub struct ResourceTracker {
    enabled: bool,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl ResourceTracker {
    /// Creates an enabled tracker with the system clock.
    pub fn new() -> Self {
        Self::with_clock(true, Arc::new(SystemClock::new()))
    }

    /// Creates a tracker with explicit enablement and clock.
    pub fn with_clock(enabled: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            enabled,
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Creates a disabled tracker; all operations are no-ops.
    pub fn disabled() -> Self {
        Self::with_clock(false, Arc::new(SystemClock::new()))
    }

    /// Whether tracking is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registers an open resource and returns its id (0 when disabled).
    pub fn track(&self, kind: impl Into<String>, metadata: Option<String>) -> u64 {
        if !self.enabled {
            return 0;
        }
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("tracker state poisoned");
        state.next_id += 1;
        let id = state.next_id;
        state.open.insert(
            id,
            TrackedResource {
                id,
                kind: kind.into(),
                metadata,
                opened_at_ms: now_ms,
            },
        );
        id
    }

    /// Marks a resource released. Fails loudly on an unknown id so double
    /// releases surface during development.
    pub fn release(&self, id: u64) -> Result<(), TrackerError> {
        if !self.enabled || id == 0 {
            return Ok(());
        }
        let mut state = self.state.lock().expect("tracker state poisoned");
        match state.open.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TrackerError::UnknownResource(id)),
        }
    }

    /// Resources open for at least `min_age_ms`.
    pub fn leaks(&self, min_age_ms: u64) -> Vec<TrackedResource> {
        if !self.enabled {
            return Vec::new();
        }
        let now_ms = self.clock.now_ms();
        let state = self.state.lock().expect("tracker state poisoned");
        let mut leaks: Vec<TrackedResource> = state
            .open
            .values()
            .filter(|r| now_ms.saturating_sub(r.opened_at_ms) >= min_age_ms)
            .cloned()
            .collect();
        leaks.sort_by_key(|r| r.opened_at_ms);
        leaks
    }

    /// Number of currently open resources.
    pub fn open_count(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.state.lock().expect("tracker state poisoned").open.len()
    }

    /// Emits a single shutdown summary of resources older than
    /// [`SHUTDOWN_LEAK_AGE_MS`] and returns how many there were.
    pub fn report_leaks(&self) -> usize {
        let leaks = self.leaks(SHUTDOWN_LEAK_AGE_MS);
        if leaks.is_empty() {
            return 0;
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("rungate_resource_leaks_total").increment(leaks.len() as u64);

        #[cfg(feature = "tracing")]
        {
            let kinds: Vec<&str> = leaks.iter().map(|r| r.kind.as_str()).collect();
            tracing::warn!(
                count = leaks.len(),
                kinds = ?kinds,
                "unreleased resources at shutdown"
            );
        }

        leaks.len()
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("enabled", &self.enabled)
            .field("open", &self.open_count())
            .finish()
    }
}

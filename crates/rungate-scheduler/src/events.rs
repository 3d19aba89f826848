//! Scheduler lifecycle events.

use crate::task::Priority;
use rungate_core::hooks::EventKind;

/// Events fired as tasks move through admission. The runtime crate owns the
/// hook set; consumers register through its builder's `on_*` methods.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A task joined the waiting queue.
    Enqueued {
        /// Task id.
        task_id: String,
        /// Task priority.
        priority: Priority,
        /// Queue depth after the enqueue.
        queue_depth: usize,
    },
    /// A task was dispatched (granted capacity).
    Dispatched {
        /// Task id.
        task_id: String,
        /// How long the task waited in the queue.
        waited_ms: u64,
    },
    /// A task was evicted to admit higher-value work.
    Evicted {
        /// Task id.
        task_id: String,
    },
    /// A waiting task exceeded its wait bound.
    TimedOut {
        /// Task id.
        task_id: String,
        /// How long the task waited before timing out.
        waited_ms: u64,
    },
    /// A waiting task's abort signal fired.
    Aborted {
        /// Task id.
        task_id: String,
    },
    /// A running task was preempted by higher-priority work.
    Preempted {
        /// Task id.
        task_id: String,
        /// Operator-supplied reason.
        reason: String,
    },
}

impl EventKind for SchedulerEvent {
    fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::Enqueued { .. } => "task_enqueued",
            SchedulerEvent::Dispatched { .. } => "task_dispatched",
            SchedulerEvent::Evicted { .. } => "task_evicted",
            SchedulerEvent::TimedOut { .. } => "task_timed_out",
            SchedulerEvent::Aborted { .. } => "task_aborted",
            SchedulerEvent::Preempted { .. } => "task_preempted",
        }
    }
}

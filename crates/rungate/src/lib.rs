//! Admission runtime for concurrent agent workloads.
//!
//! `rungate` decides when — and whether — expensive agent work may run. It
//! combines a capacity ledger, a hybrid priority scheduler, an adaptive
//! penalty controller, and a preemption engine behind one entry point:
//! [`Runtime::acquire_permit`].
//!
//! # Quick Start
//!
//! ```rust
//! use rungate::{PermitRequest, Runtime, RuntimeConfig, TaskDescriptor};
//!
//! # async fn example() {
//! let runtime = Runtime::new(RuntimeConfig::default());
//!
//! let task = TaskDescriptor::builder("task-1", "subagent")
//!     .tenant_key("workflow-7")
//!     .build();
//!
//! let permit = runtime.acquire_permit(PermitRequest::new(task)).await;
//! if let Some(lease) = permit.lease {
//!     // run the work...
//!     lease.release();
//! }
//! # }
//! ```
//!
//! # Admission flow
//!
//! A caller asks for a permit; when capacity allows and nothing queued
//! outranks it, the permit is granted immediately. Otherwise the request
//! joins the waiting queue, ordered by a composite score (priority, queue
//! class, deadline pressure, shortest-job-first, tenant fair share,
//! starvation boost), and the caller blocks — on a dispatch notification,
//! its abort signal, or its wait bound, whichever fires first.
//!
//! # Preemption
//!
//! When critical work arrives against a full ledger, a lower-priority
//! running task can be preempted: its abort token is cancelled and its state
//! is checkpointed durably for later resumption via
//! [`Runtime::resume_from_checkpoint`].
//!
//! # Error feedback
//!
//! Provider failures reported through [`Runtime::report_failure`] are
//! classified ([`classify`]) and drive a per-scope penalty that divides
//! effective parallelism; the penalty decays over idle time. In the stable
//! profile (the production default) this feedback loop is disabled and
//! limits are deterministic.

pub mod checkpoint;
pub mod config;
pub mod permit;
pub mod preempt;
pub mod runtime;

pub use checkpoint::{
    CheckpointRecord, CheckpointStore, CheckpointStoreError, InMemoryCheckpointStore,
    DEFAULT_CHECKPOINT_TTL_MS,
};
pub use config::{AdaptivePenaltyMode, ConfigError, RuntimeConfig, RuntimeConfigBuilder};
pub use permit::{PermitLease, PermitRequest, PermitResult};
pub use preempt::{should_preempt, PreemptionError, TaskResult};
pub use runtime::{ActiveExecution, Runtime, RuntimeBuilder, RuntimeSnapshot};

pub use rungate_core::classify::{classify, BackoffStrategy, Classification, ErrorCategory, RawError};
pub use rungate_core::clock::{Clock, ManualClock, SystemClock};
pub use rungate_ledger::{
    CapacityCheck, CapacityLedger, CapacityLimits, LedgerSnapshot, ReservationLease,
    ResourceTracker, SlotKind, TrackerError,
};
pub use rungate_penalty::{
    DecayStrategy, PenaltyConfig, PenaltyController, PenaltyReason, PenaltyRegistry,
    PenaltySnapshot, ReasonWeights,
};
pub use rungate_scheduler::{
    Priority, QueueClass, ResourceCost, ScoreWeights, SchedulerEvent, TaskDescriptor,
};

//! Hybrid priority scheduler for the rungate runtime.
//!
//! The waiting queue orders entries by a composite score combining strict
//! priority, queue class, deadline pressure, shortest-job-first, tenant fair
//! share, and a starvation boost, then dispatches under capacity with tenant
//! anti-starvation and bounded eviction. The queue itself is a synchronous
//! data structure; the runtime crate drives it and owns the waiting callers.

pub mod events;
pub mod queue;
pub mod score;
pub mod task;

pub use events::SchedulerEvent;
pub use queue::{EnqueueError, EnqueueOutcome, PriorityStats, QueueSnapshot, WaitEntry, WaitQueue};
pub use score::ScoreWeights;
pub use task::{Priority, QueueClass, ResourceCost, TaskDescriptor, TaskDescriptorBuilder};

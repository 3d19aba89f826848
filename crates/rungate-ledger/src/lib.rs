//! Capacity ledger for the rungate runtime.
//!
//! The ledger tracks how many expensive resource units (in-flight provider
//! requests and LLM slots) are active, reserved, or available, and hands out
//! short-lived [`ReservationLease`]s against the remaining headroom.
//!
//! # Example
//!
//! ```rust
//! use rungate_ledger::{CapacityLedger, CapacityLimits, SlotKind};
//!
//! let limits = CapacityLimits::builder()
//!     .max_total_active_requests(4)
//!     .max_total_active_llm(8)
//!     .build()
//!     .unwrap();
//! let ledger = CapacityLedger::builder(limits).build();
//!
//! let check = ledger.check_capacity(1, 1);
//! assert!(check.allowed);
//!
//! let lease = ledger.reserve("demo-tool", 1, 1, 5_000).expect("capacity");
//! ledger.consume_slots(SlotKind::Subagent, 1, 1);
//! lease.consume();
//!
//! // work happens...
//!
//! ledger.release_slots(SlotKind::Subagent, 1, 1);
//! lease.release();
//! assert_eq!(ledger.snapshot().total_active_requests, 0);
//! ```

pub mod events;
pub mod ledger;
pub mod limits;
pub mod reservation;
pub mod state;
pub mod tracker;

pub use events::LedgerEvent;
pub use ledger::{CapacityCheck, CapacityLedger, CapacityLedgerBuilder, SlotKind};
pub use limits::{CapacityLimits, CapacityLimitsBuilder, LimitsError};
pub use reservation::ReservationLease;
pub use state::{LedgerSnapshot, SubagentCounters, TeamCounters};
pub use tracker::{ResourceTracker, TrackedResource, TrackerError};

//! Core infrastructure for rungate.
//!
//! This crate provides the shared plumbing used across the rungate workspace:
//! - Error classification for retry/penalty decisions ([`classify`])
//! - Monotonic millisecond clocks ([`clock`])
//! - Observation hooks backing the components' `on_*` builder methods
//!   ([`hooks`])

pub mod classify;
pub mod clock;
pub mod hooks;

pub use classify::{classify, BackoffStrategy, Classification, ErrorCategory, RawError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use hooks::{EventKind, Hooks};

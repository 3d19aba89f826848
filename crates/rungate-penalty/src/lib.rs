//! Adaptive penalty controller.
//!
//! A penalty is a nonnegative real that divides effective parallelism in
//! response to recent provider errors. Rate limits and capacity errors push
//! it up; idle time decays it back down. In the stable profile (the
//! production default) the maximum penalty is pinned to zero and the
//! controller becomes a deterministic no-op.
//!
//! # Example
//!
//! ```rust
//! use rungate_penalty::{DecayStrategy, PenaltyConfig, PenaltyController, PenaltyReason};
//! use rungate_core::clock::ManualClock;
//!
//! let clock = ManualClock::shared(0);
//! let config = PenaltyConfig::builder()
//!     .stable(false)
//!     .max_penalty(5.0)
//!     .decay_ms(1_000)
//!     .decay_strategy(DecayStrategy::Exponential)
//!     .build();
//! let controller = PenaltyController::new(config, clock.clone());
//!
//! controller.raise(PenaltyReason::RateLimit);
//! controller.raise(PenaltyReason::RateLimit);
//! assert_eq!(controller.apply_limit(10), 2);
//!
//! clock.advance(5_000);
//! assert_eq!(controller.apply_limit(10), 8);
//! ```

pub mod config;
pub mod controller;
pub mod registry;

pub use config::{DecayStrategy, PenaltyConfig, PenaltyConfigBuilder, ReasonWeights};
pub use controller::{PenaltyController, PenaltyReason, PenaltySnapshot};
pub use registry::PenaltyRegistry;

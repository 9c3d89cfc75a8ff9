//! updraft-metrics — observability for Updraft.
//!
//! Counts event submissions by outcome and snapshots per-group rollout
//! state for Prometheus-compatible text exposition.
//!
//! # Architecture
//!
//! ```text
//! RegistrationMetrics
//!   └── record() ← called per event submission
//!
//! collect_groups() → GroupSnapshot per group, read from StateStore
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{GroupSnapshot, Outcome, RegistrationMetrics, collect_groups};
pub use prometheus::render_prometheus;

//! Updraft rollout core: event registration, instance state machine and
//! rollout policy.
//!
//! Instances report Omaha lifecycle events (download started, installed,
//! update complete, ...). Each event is validated against the instance's
//! application and group, mapped to a supported event type, recorded,
//! and then evaluated: the instance moves through its status machine and
//! the group's rollout may finish (every instance complete) or halt (the
//! first attempted instance failed).
//!
//! # Components
//!
//! - **`validate`** / **`classify`**: pre-recording checks
//! - **`transition`**: instance status machine and completion policy
//! - **`stats`**: per-group rollout aggregates
//! - **`policy`**: group convergence and halt decisions
//! - **`registrar`**: the registration pipeline
//! - **`grant`**: handing out updates and opening rollouts
//! - **`fleet`**: the store interface all of the above run against

pub mod classify;
pub mod error;
pub mod fleet;
pub mod grant;
pub mod policy;
pub mod registrar;
pub mod stats;
pub mod transition;
pub mod validate;

#[cfg(test)]
mod testing;

pub use error::{EventError, EventResult};
pub use fleet::FleetStore;
pub use grant::{Grant, UpdateGranter};
pub use policy::{ConsequenceError, RolloutDecision};
pub use registrar::{EventRegistrar, EventSubmission, Registration};
pub use stats::RolloutStats;
pub use transition::CompletionPolicy;

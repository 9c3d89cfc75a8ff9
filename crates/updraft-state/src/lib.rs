//! updraft-state — embedded state store for Updraft.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for applications, groups, instances, events, activity entries,
//! and instance status history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{application_id}:{instance_id}`, zero-padded timestamps)
//! keep related records adjacent and chronologically ordered.
//!
//! Operations that must not race (group rollout flags, id allocation) read
//! and write inside a single write transaction; redb serializes writers.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{now_millis, StateStore};
pub use types::*;

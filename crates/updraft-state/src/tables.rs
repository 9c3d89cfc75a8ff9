//! redb table definitions for the Updraft state store.
//!
//! Record tables use `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Time-ordered tables embed a zero-padded millisecond timestamp and
//! a monotonic id in the key so lexical order is chronological order.

use redb::TableDefinition;

/// Applications keyed by `{application_id}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Groups keyed by `{group_id}`.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Instances keyed by `{application_id}:{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Supported event types keyed by `{type}:{result}`, valued by internal id.
pub const EVENT_TYPES: TableDefinition<&str, u32> = TableDefinition::new("event_types");

/// Events keyed by `{application_id}:{instance_id}:{created_at:016}:{id:016}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Activity entries keyed by `{created_at:016}:{id:016}`.
pub const ACTIVITY: TableDefinition<&str, &[u8]> = TableDefinition::new("activity");

/// Status history keyed like events.
pub const STATUS_HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("status_history");

/// Monotonic id counters keyed by table name.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Shape shared by all JSON record tables.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

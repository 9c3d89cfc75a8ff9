//! Domain types for the Updraft state store.
//!
//! These types represent the persisted state of applications, rollout
//! groups, enrolled instances, reported events, and the activity log. All
//! types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use updraft_core::EventTypeId;

/// Unique identifier for an application.
pub type ApplicationId = String;

/// Unique identifier for a rollout group.
pub type GroupId = String;

/// Unique identifier for an instance (unique per application).
pub type InstanceId = String;

// ── Application ───────────────────────────────────────────────────

/// A catalog application instances can enroll in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Instances of this application only complete an update after
    /// reporting `SuccessReboot`.
    #[serde(default)]
    pub requires_reboot_completion: bool,
    /// Unix timestamp (milliseconds) when this application was created.
    #[serde(default)]
    pub created_at: u64,
}

// ── Group ─────────────────────────────────────────────────────────

/// A cohort of instances rolled out together to one target version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub application_id: ApplicationId,
    pub name: String,
    /// Version instances in this group are being moved to. Empty means no
    /// package is assigned yet.
    #[serde(default)]
    pub version: String,
    /// True between the first granted update of a cycle and convergence
    /// or halt.
    #[serde(default)]
    pub rollout_in_progress: bool,
    /// Cleared to halt further updates for the group.
    #[serde(default = "enabled")]
    pub updates_enabled: bool,
    #[serde(default)]
    pub created_at: u64,
}

fn enabled() -> bool {
    true
}

// ── Instance ──────────────────────────────────────────────────────

/// An updating host as seen by one application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub ip: String,
    #[serde(default)]
    pub alias: String,
    /// Unix timestamp (milliseconds) of first contact.
    pub created_at: u64,
    pub application: InstanceApplication,
}

/// The binding of an instance to an application and group, plus its
/// update state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceApplication {
    pub application_id: ApplicationId,
    pub group_id: GroupId,
    /// Version the instance last reported running.
    pub version: String,
    pub status: InstanceStatus,
    /// True only while the instance has been granted an update and is
    /// expected to report progress events.
    pub update_in_progress: bool,
    /// Version of the last update granted to this instance.
    pub last_update_version: Option<String>,
    pub last_check_at: u64,
    pub last_update_granted_at: Option<u64>,
}

/// Update status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Undefined,
    UpdateGranted,
    Downloading,
    Downloaded,
    Installed,
    Complete,
    Error,
}

impl InstanceStatus {
    /// Statuses that end an instance's update cycle.
    pub fn ends_update_cycle(self) -> bool {
        matches!(
            self,
            InstanceStatus::Undefined | InstanceStatus::Complete | InstanceStatus::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Undefined => "undefined",
            InstanceStatus::UpdateGranted => "update_granted",
            InstanceStatus::Downloading => "downloading",
            InstanceStatus::Downloaded => "downloaded",
            InstanceStatus::Installed => "installed",
            InstanceStatus::Complete => "complete",
            InstanceStatus::Error => "error",
        }
    }

    pub const ALL: [InstanceStatus; 7] = [
        InstanceStatus::Undefined,
        InstanceStatus::UpdateGranted,
        InstanceStatus::Downloading,
        InstanceStatus::Downloaded,
        InstanceStatus::Installed,
        InstanceStatus::Complete,
        InstanceStatus::Error,
    ];
}

// ── Events ────────────────────────────────────────────────────────

/// An event as submitted for recording.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type_id: EventTypeId,
    pub instance_id: InstanceId,
    pub application_id: ApplicationId,
    pub previous_version: String,
    pub error_code: String,
    pub created_at: u64,
}

/// A recorded event. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: u64,
    pub created_at: u64,
    pub event_type_id: EventTypeId,
    pub instance_id: InstanceId,
    pub application_id: ApplicationId,
    pub previous_version: String,
    pub error_code: String,
}

// ── Activity ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityClass {
    RolloutStarted,
    RolloutFinished,
    RolloutFailed,
    InstanceUpdateFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySeverity {
    Success,
    Info,
    Warning,
    Error,
}

/// An activity entry as submitted for recording.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub class: ActivityClass,
    pub severity: ActivitySeverity,
    pub version: String,
    pub application_id: ApplicationId,
    pub group_id: GroupId,
    /// Set for instance-scoped entries.
    pub instance_id: Option<InstanceId>,
    pub created_at: u64,
}

/// A recorded audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: u64,
    pub created_at: u64,
    pub class: ActivityClass,
    pub severity: ActivitySeverity,
    pub version: String,
    pub application_id: ApplicationId,
    pub group_id: GroupId,
    pub instance_id: Option<InstanceId>,
}

// ── Status history ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub created_at: u64,
    pub instance_id: InstanceId,
    pub application_id: ApplicationId,
    pub status: InstanceStatus,
    /// The instance's `last_update_version` at the time of the write.
    pub version: Option<String>,
}

// ── Keys ──────────────────────────────────────────────────────────

/// Separator between the parts of a composite key.
pub const KEY_SEPARATOR: char = ':';

/// Whether `id` can be embedded in a composite key. Ids are non-empty and
/// never contain [`KEY_SEPARATOR`].
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(KEY_SEPARATOR)
}

/// Key of an instance within `application_id`.
pub fn instance_key(application_id: &str, instance_id: &str) -> String {
    format!("{application_id}:{instance_id}")
}

/// Prefix shared by all time-ordered rows of one instance.
pub fn instance_prefix(application_id: &str, instance_id: &str) -> String {
    format!("{application_id}:{instance_id}:")
}

/// Time-ordered row key. Millisecond timestamps fit in 16 digits until
/// the year 318857.
pub fn ordered_key(prefix: &str, created_at: u64, id: u64) -> String {
    format!("{prefix}{created_at:016}:{id:016}")
}

impl Instance {
    pub fn table_key(&self) -> String {
        instance_key(&self.application.application_id, &self.id)
    }
}

impl Event {
    pub fn table_key(&self) -> String {
        ordered_key(
            &instance_prefix(&self.application_id, &self.instance_id),
            self.created_at,
            self.id,
        )
    }
}

impl Activity {
    pub fn table_key(&self) -> String {
        ordered_key("", self.created_at, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_keys_sort_chronologically() {
        let a = ordered_key("app:i1:", 999, 7);
        let b = ordered_key("app:i1:", 1_000, 1);
        let c = ordered_key("app:i1:", 1_000, 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn ids_must_not_contain_key_separator() {
        assert!(is_valid_id("e96281a6-d1af-4bde-9a0a-97b76e56dc57"));
        assert!(is_valid_id("i0"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a:b"));
        assert!(!is_valid_id(":"));
    }

    #[test]
    fn cycle_ending_statuses() {
        assert!(InstanceStatus::Complete.ends_update_cycle());
        assert!(InstanceStatus::Error.ends_update_cycle());
        assert!(InstanceStatus::Undefined.ends_update_cycle());
        assert!(!InstanceStatus::Downloading.ends_update_cycle());
        assert!(!InstanceStatus::UpdateGranted.ends_update_cycle());
    }

    #[test]
    fn group_defaults_to_updates_enabled() {
        let json = r#"{"id":"g1","application_id":"app","name":"stable"}"#;
        let group: Group = serde_json::from_str(json).unwrap();
        assert!(group.updates_enabled);
        assert!(!group.rollout_in_progress);
        assert!(group.version.is_empty());
    }
}

//! Metrics collection: registration outcome counters and per-group fleet
//! snapshots.
//!
//! Counters are lock-free atomics bumped by the API on every submission.
//! Group snapshots are read from the state store at scrape time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use updraft_rollout::{EventError, RolloutStats};
use updraft_state::{InstanceStatus, StateResult, StateStore};

/// Outcome label of one event submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Accepted,
    Ignored,
    InvalidInstance,
    InvalidApplicationOrGroup,
    InvalidEventType,
    NoUpdateInProgress,
    Failed,
}

impl Outcome {
    pub const ALL: [Outcome; 7] = [
        Outcome::Accepted,
        Outcome::Ignored,
        Outcome::InvalidInstance,
        Outcome::InvalidApplicationOrGroup,
        Outcome::InvalidEventType,
        Outcome::NoUpdateInProgress,
        Outcome::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Ignored => "ignored",
            Outcome::InvalidInstance => "invalid_instance",
            Outcome::InvalidApplicationOrGroup => "invalid_application_or_group",
            Outcome::InvalidEventType => "invalid_event_type",
            Outcome::NoUpdateInProgress => "no_update_in_progress",
            Outcome::Failed => "failed",
        }
    }

    /// Classify a registration error.
    pub fn of_error(err: &EventError) -> Self {
        match err {
            EventError::FlatcarEventIgnored => Outcome::Ignored,
            EventError::InvalidInstance => Outcome::InvalidInstance,
            EventError::InvalidApplicationOrGroup => Outcome::InvalidApplicationOrGroup,
            EventError::InvalidEventTypeOrResult => Outcome::InvalidEventType,
            EventError::NoUpdateInProgress => Outcome::NoUpdateInProgress,
            _ => Outcome::Failed,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Counts event submissions by outcome since process start.
#[derive(Debug, Default)]
pub struct RegistrationMetrics {
    counts: [AtomicU64; 7],
    consequence_failures: AtomicU64,
}

impl RegistrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        self.counts[outcome.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// A recorded event whose rollout evaluation did not complete.
    pub fn record_consequence_failure(&self) {
        self.consequence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.counts[outcome.index()].load(Ordering::Relaxed)
    }

    pub fn consequence_failures(&self) -> u64 {
        self.consequence_failures.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSnapshot {
    pub group_id: String,
    pub application_id: String,
    pub version: String,
    pub rollout_in_progress: bool,
    pub updates_enabled: bool,
    /// Instance count per status, every status present.
    pub instances_by_status: BTreeMap<&'static str, u32>,
    pub stats: RolloutStats,
}

/// Snapshot every group of every application.
pub fn collect_groups(store: &StateStore) -> StateResult<Vec<GroupSnapshot>> {
    let mut snapshots = Vec::new();
    for app in store.list_applications()? {
        for group in store.list_groups_for_application(&app.id)? {
            let instances = store.list_instances_for_group(&group.id)?;
            let mut by_status: BTreeMap<&'static str, u32> =
                InstanceStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
            for inst in &instances {
                *by_status.entry(inst.application.status.as_str()).or_default() += 1;
            }
            snapshots.push(GroupSnapshot {
                stats: RolloutStats::from_instances(&group, &instances),
                group_id: group.id,
                application_id: group.application_id,
                version: group.version,
                rollout_in_progress: group.rollout_in_progress,
                updates_enabled: group.updates_enabled,
                instances_by_status: by_status,
            });
        }
    }
    debug!(groups = snapshots.len(), "fleet snapshot collected");
    Ok(snapshots)
}

//! Rollout stats: per-group aggregate counts, computed on demand.

use serde::Serialize;
use updraft_state::{Group, Instance, InstanceStatus, StateResult};

use crate::fleet::FleetStore;

/// Aggregate update progress of a group toward its target version.
///
/// Never stored; recomputed from instance state for every decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RolloutStats {
    /// Instances bound to the group.
    pub total_instances: u32,
    /// Instances that finished an update cycle toward the group's current
    /// version, whatever the outcome.
    pub updates_to_current_version_attempted: u32,
    /// Attempted instances that reached `Complete`.
    pub updates_to_current_version_succeeded: u32,
    /// Attempted instances that ended in `Error`.
    pub updates_to_current_version_failed: u32,
    /// Instances with an update currently in flight.
    pub updates_in_progress: u32,
}

impl RolloutStats {
    /// Aggregate a snapshot of the group's instances.
    pub fn from_instances(group: &Group, instances: &[Instance]) -> Self {
        let mut stats = RolloutStats::default();
        for inst in instances.iter().filter(|i| i.application.group_id == group.id) {
            let app = &inst.application;
            stats.total_instances += 1;
            if app.update_in_progress {
                stats.updates_in_progress += 1;
            }
            let on_current = !group.version.is_empty()
                && app.last_update_version.as_deref() == Some(group.version.as_str());
            // An attempt only counts once its update cycle has ended.
            if !on_current || app.update_in_progress {
                continue;
            }
            stats.updates_to_current_version_attempted += 1;
            match app.status {
                InstanceStatus::Complete => stats.updates_to_current_version_succeeded += 1,
                InstanceStatus::Error => stats.updates_to_current_version_failed += 1,
                _ => {}
            }
        }
        stats
    }

    /// Read the group's instances from the store and aggregate them.
    pub fn compute<S: FleetStore + ?Sized>(store: &S, group: &Group) -> StateResult<Self> {
        let instances = store.list_instances_for_group(&group.id)?;
        Ok(Self::from_instances(group, &instances))
    }

    /// Every instance completed the current version. Groups nobody has
    /// attempted yet never count as converged.
    pub fn converged(&self) -> bool {
        self.total_instances > 0
            && self.updates_to_current_version_attempted > 0
            && self.updates_to_current_version_succeeded == self.total_instances
    }

    /// Exactly one instance has attempted the current version.
    pub fn is_first_attempt(&self) -> bool {
        self.updates_to_current_version_attempted == 1
    }
}

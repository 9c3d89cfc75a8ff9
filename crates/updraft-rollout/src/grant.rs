//! Update granting: hands an instance its group's target version and
//! opens the group's rollout on the first grant of a cycle.

use semver::Version;
use tracing::{debug, error, info};
use updraft_state::{ActivityClass, ActivitySeverity, Instance, NewActivity, now_millis};

use crate::error::{EventError, EventResult};
use crate::fleet::FleetStore;

/// A granted update.
#[derive(Debug, Clone)]
pub struct Grant {
    pub instance: Instance,
    /// This grant opened the group's rollout.
    pub rollout_started: bool,
}

#[derive(Clone)]
pub struct UpdateGranter<S> {
    store: S,
}

impl<S: FleetStore> UpdateGranter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn grant_update(
        &self,
        instance_id: &str,
        application_id: &str,
        group_id: &str,
    ) -> EventResult<Grant> {
        let Some((application_id, group_id)) = self
            .store
            .resolve_application_and_group(application_id, group_id)?
        else {
            return Err(EventError::InvalidApplicationOrGroup);
        };
        let group = self
            .store
            .get_group(&group_id)?
            .ok_or(EventError::InvalidApplicationOrGroup)?;
        let instance = self
            .store
            .get_instance(instance_id, &application_id)?
            .ok_or(EventError::InvalidInstance)?;
        if instance.application.group_id != group_id {
            return Err(EventError::InvalidApplicationOrGroup);
        }

        if !group.updates_enabled {
            return Err(EventError::UpdatesDisabled(group_id));
        }
        if group.version.is_empty() {
            return Err(EventError::NoTargetVersion(group_id));
        }
        if instance.application.update_in_progress {
            return Err(EventError::UpdateAlreadyInProgress);
        }
        if is_at_or_above(&instance.application.version, &group.version) {
            debug!(
                instance = %instance_id,
                version = %instance.application.version,
                target = %group.version,
                "instance already up to date"
            );
            return Err(EventError::AlreadyUpToDate(instance.application.version));
        }

        let at = now_millis();
        let instance = self
            .store
            .grant_update(instance_id, &application_id, &group.version, at)?;

        let rollout_started = match self.store.set_group_rollout_in_progress(&group_id, true) {
            Ok(changed) => changed,
            Err(e) => {
                error!(group = %group_id, error = %e, "failed to mark rollout in progress");
                false
            }
        };
        if rollout_started {
            info!(
                group = %group_id,
                application = %application_id,
                version = %group.version,
                "rollout started"
            );
            let activity = NewActivity {
                class: ActivityClass::RolloutStarted,
                severity: ActivitySeverity::Info,
                version: group.version.clone(),
                application_id: application_id.clone(),
                group_id: group_id.clone(),
                instance_id: None,
                created_at: at,
            };
            if let Err(e) = self.store.append_activity(&activity) {
                error!(group = %group_id, error = %e, "failed to append activity entry");
            }
        }

        info!(
            instance = %instance_id,
            group = %group_id,
            version = %group.version,
            "update granted"
        );
        Ok(Grant {
            instance,
            rollout_started,
        })
    }
}

/// Semver comparison when both sides parse, plain equality otherwise.
fn is_at_or_above(current: &str, target: &str) -> bool {
    match (Version::parse(current), Version::parse(target)) {
        (Ok(current), Ok(target)) => current >= target,
        _ => current == target,
    }
}

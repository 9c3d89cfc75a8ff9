//! Rollout policy engine: decides what a recorded event means for its
//! instance and its group.
//!
//! Runs after the event is durable. Nothing here is surfaced to the
//! submitter: individual writes are logged and skipped, and only a missing
//! group or unreadable stats abort the evaluation (as a
//! [`ConsequenceError`] the registrar logs).

use thiserror::Error;
use tracing::{debug, error, info, warn};
use updraft_core::{EventKind, ProtocolResult, RolloutConfig};
use updraft_state::{ActivityClass, ActivitySeverity, Group, InstanceStatus, NewActivity, StateError};

use crate::fleet::FleetStore;
use crate::stats::RolloutStats;
use crate::transition::{CompletionPolicy, next_status};

/// What the evaluation concluded about the group's rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutDecision {
    /// Nothing to do at group level.
    Continue,
    /// Every instance completed the target version and this evaluation
    /// ended the rollout.
    Finished,
    /// The first attempted instance failed and this evaluation disabled
    /// updates or ended the rollout.
    Halted,
}

impl RolloutDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RolloutDecision::Continue => "continue",
            RolloutDecision::Finished => "finished",
            RolloutDecision::Halted => "halted",
        }
    }
}

/// Failures that stop a rollout evaluation partway.
#[derive(Debug, Error)]
pub enum ConsequenceError {
    #[error("group {0} not found")]
    GroupMissing(String),

    #[error("failed to load group {group}: {source}")]
    Group {
        group: String,
        #[source]
        source: StateError,
    },

    #[error("failed to compute rollout stats for group {group}: {source}")]
    Stats {
        group: String,
        #[source]
        source: StateError,
    },
}

/// The facts about one recorded event the engine needs.
#[derive(Debug, Clone)]
pub struct EventContext<'a> {
    pub instance_id: &'a str,
    pub application_id: &'a str,
    pub group_id: &'a str,
    /// The instance's last granted version, as read during validation.
    pub last_update_version: Option<&'a str>,
    pub kind: EventKind,
    pub result: ProtocolResult,
    pub policy: CompletionPolicy,
    pub at: u64,
}

/// Applies instance status transitions and group-level rollout rules.
pub struct PolicyEngine<'a, S: ?Sized> {
    store: &'a S,
    config: &'a RolloutConfig,
}

impl<'a, S: FleetStore + ?Sized> PolicyEngine<'a, S> {
    pub fn new(store: &'a S, config: &'a RolloutConfig) -> Self {
        Self { store, config }
    }

    pub fn evaluate(&self, ctx: &EventContext<'_>) -> Result<RolloutDecision, ConsequenceError> {
        let Some(status) = next_status(ctx.kind, ctx.result, ctx.policy) else {
            debug!(
                instance = %ctx.instance_id,
                kind = ?ctx.kind,
                result = ?ctx.result,
                "event has no status consequence"
            );
            return Ok(RolloutDecision::Continue);
        };

        if let Err(e) = self.store.update_instance_status(
            ctx.instance_id,
            ctx.application_id,
            status,
            ctx.at,
        ) {
            error!(
                instance = %ctx.instance_id,
                application = %ctx.application_id,
                status = status.as_str(),
                error = %e,
                "failed to update instance status"
            );
        }

        match status {
            InstanceStatus::Complete => self.on_complete(ctx),
            InstanceStatus::Error => self.on_error(ctx),
            _ => Ok(RolloutDecision::Continue),
        }
    }

    fn on_complete(&self, ctx: &EventContext<'_>) -> Result<RolloutDecision, ConsequenceError> {
        let group = self.load_group(ctx.group_id)?;
        let stats = self.stats(&group)?;
        if !stats.converged() {
            debug!(
                group = %group.id,
                succeeded = stats.updates_to_current_version_succeeded,
                total = stats.total_instances,
                "rollout not converged"
            );
            return Ok(RolloutDecision::Continue);
        }

        if !self.clear_rollout(&group) {
            debug!(group = %group.id, "rollout already finished");
            return Ok(RolloutDecision::Continue);
        }
        info!(
            group = %group.id,
            application = %group.application_id,
            version = %group.version,
            instances = stats.total_instances,
            "rollout finished"
        );
        self.record_activity(
            ctx,
            ActivityClass::RolloutFinished,
            ActivitySeverity::Success,
            activity_version(ctx, Some(&group)),
            None,
        );
        Ok(RolloutDecision::Finished)
    }

    fn on_error(&self, ctx: &EventContext<'_>) -> Result<RolloutDecision, ConsequenceError> {
        let group = self.load_group(ctx.group_id);
        self.record_activity(
            ctx,
            ActivityClass::InstanceUpdateFailed,
            ActivitySeverity::Error,
            activity_version(ctx, group.as_ref().ok()),
            Some(ctx.instance_id),
        );

        if !self.config.disable_updates_on_failed_rollout {
            return Ok(RolloutDecision::Continue);
        }

        let group = group?;
        let stats = self.stats(&group)?;
        if !stats.is_first_attempt() {
            return Ok(RolloutDecision::Continue);
        }

        let disabled = match self.store.disable_updates(&group.id) {
            Ok(true) => {
                warn!(group = %group.id, "updates disabled after first failed update");
                true
            }
            Ok(false) => {
                debug!(group = %group.id, "updates already disabled");
                false
            }
            Err(e) => {
                error!(group = %group.id, error = %e, "failed to disable updates");
                false
            }
        };

        let cleared = self.clear_rollout(&group);
        if cleared {
            warn!(
                group = %group.id,
                application = %group.application_id,
                version = %group.version,
                "rollout halted"
            );
            self.record_activity(
                ctx,
                ActivityClass::RolloutFailed,
                ActivitySeverity::Error,
                activity_version(ctx, Some(&group)),
                None,
            );
        }
        if disabled || cleared {
            Ok(RolloutDecision::Halted)
        } else {
            Ok(RolloutDecision::Continue)
        }
    }

    fn load_group(&self, group_id: &str) -> Result<Group, ConsequenceError> {
        match self.store.get_group(group_id) {
            Ok(Some(group)) => Ok(group),
            Ok(None) => Err(ConsequenceError::GroupMissing(group_id.to_string())),
            Err(source) => Err(ConsequenceError::Group {
                group: group_id.to_string(),
                source,
            }),
        }
    }

    fn stats(&self, group: &Group) -> Result<RolloutStats, ConsequenceError> {
        RolloutStats::compute(self.store, group).map_err(|source| ConsequenceError::Stats {
            group: group.id.clone(),
            source,
        })
    }

    /// Compare-and-set the rollout flag off. Returns whether this call is
    /// the one that ended the rollout. On a store error, falls back to the
    /// snapshot taken before the attempt.
    fn clear_rollout(&self, group: &Group) -> bool {
        match self.store.set_group_rollout_in_progress(&group.id, false) {
            Ok(changed) => changed,
            Err(e) => {
                error!(group = %group.id, error = %e, "failed to clear rollout flag");
                group.rollout_in_progress
            }
        }
    }

    fn record_activity(
        &self,
        ctx: &EventContext<'_>,
        class: ActivityClass,
        severity: ActivitySeverity,
        version: String,
        instance_id: Option<&str>,
    ) {
        let activity = NewActivity {
            class,
            severity,
            version,
            application_id: ctx.application_id.to_string(),
            group_id: ctx.group_id.to_string(),
            instance_id: instance_id.map(str::to_string),
            created_at: ctx.at,
        };
        if let Err(e) = self.store.append_activity(&activity) {
            error!(
                group = %ctx.group_id,
                class = ?class,
                error = %e,
                "failed to append activity entry"
            );
        }
    }
}

/// The instance's last granted version, or the group's target when the
/// instance has none.
fn activity_version(ctx: &EventContext<'_>, group: Option<&Group>) -> String {
    ctx.last_update_version
        .map(str::to_string)
        .or_else(|| group.map(|g| g.version.clone()))
        .unwrap_or_default()
}

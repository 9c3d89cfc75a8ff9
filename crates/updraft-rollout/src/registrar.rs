//! Event registration: the entry point for lifecycle events reported by
//! updating instances.
//!
//! The pipeline is validate, classify, resolve the completion policy,
//! screen stale reboot completions, record, then evaluate consequences.
//! Recording is the durability boundary: failures before it are returned
//! to the caller, failures after it are logged and the registration still
//! succeeds.

use serde::Deserialize;
use tracing::{debug, error, info};
use updraft_core::RolloutConfig;
use updraft_state::{Event, InstanceStatus, NewEvent, now_millis};

use crate::classify::classify;
use crate::error::{EventError, EventResult};
use crate::fleet::FleetStore;
use crate::policy::{EventContext, PolicyEngine, RolloutDecision};
use crate::transition::{CompletionPolicy, is_stale_reboot_completion};
use crate::validate::validate;

/// An event as reported by an instance.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSubmission {
    pub instance_id: String,
    pub application_id: String,
    pub group_id: String,
    /// Protocol event type code.
    pub event_type: u32,
    /// Protocol event result code.
    pub event_result: u32,
    #[serde(default)]
    pub previous_version: String,
    #[serde(default)]
    pub error_code: String,
}

/// A successfully recorded event.
#[derive(Debug, Clone)]
pub struct Registration {
    pub event: Event,
    /// `None` when the consequence evaluation could not complete.
    pub decision: Option<RolloutDecision>,
}

/// Registers events against a fleet store.
#[derive(Clone)]
pub struct EventRegistrar<S> {
    store: S,
    config: RolloutConfig,
}

impl<S: FleetStore> EventRegistrar<S> {
    pub fn new(store: S, config: RolloutConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    pub fn register_event(&self, sub: &EventSubmission) -> EventResult<Registration> {
        let validated = validate(
            &self.store,
            &sub.instance_id,
            &sub.application_id,
            &sub.group_id,
        )?;
        let class = classify(&self.store, sub.event_type, sub.event_result)?;

        let application = self.store.get_application(&validated.application_id)?;
        let policy = CompletionPolicy::resolve(
            &validated.application_id,
            application.as_ref(),
            &self.config,
        );

        let at = now_millis();

        if is_stale_reboot_completion(class.kind, class.result, &sub.previous_version, policy) {
            if let Err(e) = self.store.update_instance_status(
                &sub.instance_id,
                &validated.application_id,
                InstanceStatus::Undefined,
                at,
            ) {
                error!(
                    instance = %sub.instance_id,
                    application = %validated.application_id,
                    error = %e,
                    "failed to reset instance after stale reboot completion"
                );
            }
            info!(
                instance = %sub.instance_id,
                application = %validated.application_id,
                previous_version = %sub.previous_version,
                "ignoring reboot completion without previous version"
            );
            return Err(EventError::FlatcarEventIgnored);
        }

        let event = self
            .store
            .record_event(&NewEvent {
                event_type_id: class.event_type_id,
                instance_id: sub.instance_id.clone(),
                application_id: validated.application_id.clone(),
                previous_version: sub.previous_version.clone(),
                error_code: sub.error_code.clone(),
                created_at: at,
            })
            .map_err(EventError::EventRegistrationFailed)?;

        debug!(
            instance = %sub.instance_id,
            event_id = event.id,
            event_type = event.event_type_id,
            "event registered"
        );

        let ctx = EventContext {
            instance_id: &sub.instance_id,
            application_id: &validated.application_id,
            group_id: &validated.group_id,
            last_update_version: validated.instance.application.last_update_version.as_deref(),
            kind: class.kind,
            result: class.result,
            policy,
            at,
        };
        let decision = match PolicyEngine::new(&self.store, &self.config).evaluate(&ctx) {
            Ok(decision) => Some(decision),
            Err(e) => {
                error!(
                    instance = %sub.instance_id,
                    group = %validated.group_id,
                    error = %e,
                    "rollout evaluation failed"
                );
                None
            }
        };

        Ok(Registration { event, decision })
    }
}

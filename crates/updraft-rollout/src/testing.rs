//! Shared fixtures for the rollout tests.

use std::collections::HashSet;
use std::sync::Mutex;

use updraft_core::EventTypeId;
use updraft_state::*;

use crate::fleet::FleetStore;

pub const APP: &str = "app-plain";
pub const GROUP: &str = "group-plain";
pub const REBOOT_APP: &str = "app-reboot";
pub const REBOOT_GROUP: &str = "group-reboot";
pub const TARGET: &str = "2.0.0";
pub const RUNNING: &str = "1.0.0";

/// An in-memory store with a plain and a reboot-completion application,
/// one group each targeting [`TARGET`], and `instances` instances
/// (`i0`, `i1`, ...) enrolled in both groups.
pub fn seeded_store(instances: usize) -> StateStore {
    let store = StateStore::open_in_memory().unwrap();
    for (app, group, reboot) in [(APP, GROUP, false), (REBOOT_APP, REBOOT_GROUP, true)] {
        store
            .put_application(&Application {
                id: app.to_string(),
                name: app.to_string(),
                description: String::new(),
                requires_reboot_completion: reboot,
                created_at: 1,
            })
            .unwrap();
        store
            .put_group(&Group {
                id: group.to_string(),
                application_id: app.to_string(),
                name: "stable".to_string(),
                version: TARGET.to_string(),
                rollout_in_progress: false,
                updates_enabled: true,
                created_at: 1,
            })
            .unwrap();
        for n in 0..instances {
            store
                .register_instance(&format!("i{n}"), app, group, RUNNING, "10.0.0.1", 2)
                .unwrap();
        }
    }
    store
}

/// Grant `instance` the target version and mark the group's rollout as
/// started, bypassing the granter's checks.
pub fn grant(store: &StateStore, app: &str, group: &str, instance: &str) {
    store.grant_update(instance, app, TARGET, 3).unwrap();
    store.set_group_rollout_in_progress(group, true).unwrap();
}

pub fn group(store: &StateStore, group_id: &str) -> Group {
    store.get_group(group_id).unwrap().unwrap()
}

pub fn instance(store: &StateStore, app: &str, instance_id: &str) -> Instance {
    store.get_instance(instance_id, app).unwrap().unwrap()
}

pub fn activity_of(store: &StateStore, class: ActivityClass) -> Vec<Activity> {
    store
        .list_activity(0, u64::MAX)
        .unwrap()
        .into_iter()
        .filter(|a| a.class == class)
        .collect()
}

/// Operations a [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    UpdateStatus,
    RecordEvent,
    ListInstances,
    SetRollout,
    DisableUpdates,
    AppendActivity,
}

/// A [`StateStore`] that fails selected operations with a write error.
pub struct FaultyStore {
    pub inner: StateStore,
    faults: Mutex<HashSet<Fault>>,
}

impl FaultyStore {
    pub fn new(inner: StateStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    fn check(&self, fault: Fault) -> StateResult<()> {
        if self.faults.lock().unwrap().contains(&fault) {
            return Err(StateError::Write(format!("injected {fault:?}")));
        }
        Ok(())
    }
}

impl FleetStore for FaultyStore {
    fn get_application(&self, application_id: &str) -> StateResult<Option<Application>> {
        self.inner.get_application(application_id)
    }

    fn get_instance(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> StateResult<Option<Instance>> {
        self.inner.get_instance(instance_id, application_id)
    }

    fn get_group(&self, group_id: &str) -> StateResult<Option<Group>> {
        self.inner.get_group(group_id)
    }

    fn resolve_application_and_group(
        &self,
        application_id: &str,
        group_id: &str,
    ) -> StateResult<Option<(ApplicationId, GroupId)>> {
        self.inner
            .resolve_application_and_group(application_id, group_id)
    }

    fn list_instances_for_group(&self, group_id: &str) -> StateResult<Vec<Instance>> {
        self.check(Fault::ListInstances)?;
        self.inner.list_instances_for_group(group_id)
    }

    fn update_instance_status(
        &self,
        instance_id: &str,
        application_id: &str,
        status: InstanceStatus,
        at: u64,
    ) -> StateResult<Instance> {
        self.check(Fault::UpdateStatus)?;
        self.inner
            .update_instance_status(instance_id, application_id, status, at)
    }

    fn grant_update(
        &self,
        instance_id: &str,
        application_id: &str,
        version: &str,
        at: u64,
    ) -> StateResult<Instance> {
        self.inner
            .grant_update(instance_id, application_id, version, at)
    }

    fn lookup_event_type_id(
        &self,
        event_type: u32,
        event_result: u32,
    ) -> StateResult<Option<EventTypeId>> {
        self.inner.lookup_event_type_id(event_type, event_result)
    }

    fn record_event(&self, event: &NewEvent) -> StateResult<Event> {
        self.check(Fault::RecordEvent)?;
        self.inner.record_event(event)
    }

    fn set_group_rollout_in_progress(
        &self,
        group_id: &str,
        in_progress: bool,
    ) -> StateResult<bool> {
        self.check(Fault::SetRollout)?;
        self.inner
            .set_group_rollout_in_progress(group_id, in_progress)
    }

    fn disable_updates(&self, group_id: &str) -> StateResult<bool> {
        self.check(Fault::DisableUpdates)?;
        self.inner.disable_updates(group_id)
    }

    fn append_activity(&self, activity: &NewActivity) -> StateResult<Activity> {
        self.check(Fault::AppendActivity)?;
        self.inner.append_activity(activity)
    }

    fn latest_error_code(
        &self,
        instance_id: &str,
        application_id: &str,
        at: u64,
    ) -> StateResult<Option<String>> {
        self.inner
            .latest_error_code(instance_id, application_id, at)
    }
}

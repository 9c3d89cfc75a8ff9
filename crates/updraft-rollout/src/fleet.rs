//! The store interface the rollout core depends on.
//!
//! `StateStore` is the production implementation; tests wrap it to inject
//! failures at individual operations.

use updraft_core::EventTypeId;
use updraft_state::*;

/// Durable lookup and mutation of applications, groups, instances, events
/// and activity entries.
pub trait FleetStore {
    fn get_application(&self, application_id: &str) -> StateResult<Option<Application>>;

    fn get_instance(&self, instance_id: &str, application_id: &str)
    -> StateResult<Option<Instance>>;

    fn get_group(&self, group_id: &str) -> StateResult<Option<Group>>;

    /// `None` unless both exist and the group belongs to the application.
    fn resolve_application_and_group(
        &self,
        application_id: &str,
        group_id: &str,
    ) -> StateResult<Option<(ApplicationId, GroupId)>>;

    fn list_instances_for_group(&self, group_id: &str) -> StateResult<Vec<Instance>>;

    fn update_instance_status(
        &self,
        instance_id: &str,
        application_id: &str,
        status: InstanceStatus,
        at: u64,
    ) -> StateResult<Instance>;

    fn grant_update(
        &self,
        instance_id: &str,
        application_id: &str,
        version: &str,
        at: u64,
    ) -> StateResult<Instance>;

    fn lookup_event_type_id(
        &self,
        event_type: u32,
        event_result: u32,
    ) -> StateResult<Option<EventTypeId>>;

    fn record_event(&self, event: &NewEvent) -> StateResult<Event>;

    /// Compare-and-set; returns whether the flag changed.
    fn set_group_rollout_in_progress(&self, group_id: &str, in_progress: bool)
    -> StateResult<bool>;

    /// Returns whether updates were enabled before the call.
    fn disable_updates(&self, group_id: &str) -> StateResult<bool>;

    fn append_activity(&self, activity: &NewActivity) -> StateResult<Activity>;

    fn latest_error_code(
        &self,
        instance_id: &str,
        application_id: &str,
        at: u64,
    ) -> StateResult<Option<String>>;
}

impl FleetStore for StateStore {
    fn get_application(&self, application_id: &str) -> StateResult<Option<Application>> {
        StateStore::get_application(self, application_id)
    }

    fn get_instance(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> StateResult<Option<Instance>> {
        StateStore::get_instance(self, instance_id, application_id)
    }

    fn get_group(&self, group_id: &str) -> StateResult<Option<Group>> {
        StateStore::get_group(self, group_id)
    }

    fn resolve_application_and_group(
        &self,
        application_id: &str,
        group_id: &str,
    ) -> StateResult<Option<(ApplicationId, GroupId)>> {
        StateStore::resolve_application_and_group(self, application_id, group_id)
    }

    fn list_instances_for_group(&self, group_id: &str) -> StateResult<Vec<Instance>> {
        StateStore::list_instances_for_group(self, group_id)
    }

    fn update_instance_status(
        &self,
        instance_id: &str,
        application_id: &str,
        status: InstanceStatus,
        at: u64,
    ) -> StateResult<Instance> {
        StateStore::update_instance_status(self, instance_id, application_id, status, at)
    }

    fn grant_update(
        &self,
        instance_id: &str,
        application_id: &str,
        version: &str,
        at: u64,
    ) -> StateResult<Instance> {
        StateStore::grant_update(self, instance_id, application_id, version, at)
    }

    fn lookup_event_type_id(
        &self,
        event_type: u32,
        event_result: u32,
    ) -> StateResult<Option<EventTypeId>> {
        StateStore::lookup_event_type_id(self, event_type, event_result)
    }

    fn record_event(&self, event: &NewEvent) -> StateResult<Event> {
        StateStore::record_event(self, event)
    }

    fn set_group_rollout_in_progress(
        &self,
        group_id: &str,
        in_progress: bool,
    ) -> StateResult<bool> {
        StateStore::set_group_rollout_in_progress(self, group_id, in_progress)
    }

    fn disable_updates(&self, group_id: &str) -> StateResult<bool> {
        StateStore::disable_updates(self, group_id)
    }

    fn append_activity(&self, activity: &NewActivity) -> StateResult<Activity> {
        StateStore::append_activity(self, activity)
    }

    fn latest_error_code(
        &self,
        instance_id: &str,
        application_id: &str,
        at: u64,
    ) -> StateResult<Option<String>> {
        StateStore::latest_error_code(self, instance_id, application_id, at)
    }
}

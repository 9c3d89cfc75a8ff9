//! StateStore: redb-backed state persistence for Updraft.
//!
//! Provides typed operations over applications, groups, instances, events,
//! activity entries and status history. All record values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use updraft_core::{EventTypeId, SUPPORTED_EVENT_TYPES};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const EVENT_COUNTER: &str = "events";
const ACTIVITY_COUNTER: &str = "activity";
const HISTORY_COUNTER: &str = "status_history";

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet and seed the event type table.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(ACTIVITY).map_err(map_err!(Table))?;
        txn.open_table(STATUS_HISTORY).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        {
            let mut table = txn.open_table(EVENT_TYPES).map_err(map_err!(Table))?;
            for def in &SUPPORTED_EVENT_TYPES {
                let key = event_type_key(def.kind.code(), def.result.code());
                table.insert(key.as_str(), def.id).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record helpers ─────────────────────────────────────

    fn put_record<T: Serialize>(
        &self,
        def: RecordTable,
        key: &str,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Collect every record of a table that passes `keep`.
    fn scan_records<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        keep: impl Fn(&T) -> bool,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Collect the records whose keys fall in `[start, end)`, in key order.
    fn range_records<T: DeserializeOwned>(
        &self,
        def: RecordTable,
        start: &str,
        end: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range::<&str>(start..end).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    // ── Applications ───────────────────────────────────────────────

    /// Insert or update an application.
    pub fn put_application(&self, app: &Application) -> StateResult<()> {
        check_id("application", &app.id)?;
        self.put_record(APPLICATIONS, &app.id, app)?;
        debug!(application = %app.id, "application stored");
        Ok(())
    }

    pub fn get_application(&self, application_id: &str) -> StateResult<Option<Application>> {
        self.get_record(APPLICATIONS, application_id)
    }

    pub fn list_applications(&self) -> StateResult<Vec<Application>> {
        self.scan_records(APPLICATIONS, |_: &Application| true)
    }

    // ── Groups ─────────────────────────────────────────────────────

    /// Insert or update a group.
    pub fn put_group(&self, group: &Group) -> StateResult<()> {
        check_id("group", &group.id)?;
        check_id("application", &group.application_id)?;
        self.put_record(GROUPS, &group.id, group)?;
        debug!(group = %group.id, application = %group.application_id, "group stored");
        Ok(())
    }

    pub fn get_group(&self, group_id: &str) -> StateResult<Option<Group>> {
        self.get_record(GROUPS, group_id)
    }

    pub fn list_groups_for_application(&self, application_id: &str) -> StateResult<Vec<Group>> {
        self.scan_records(GROUPS, |g: &Group| g.application_id == application_id)
    }

    /// Check that both records exist and the group belongs to the
    /// application. Returns the canonical ids on success.
    pub fn resolve_application_and_group(
        &self,
        application_id: &str,
        group_id: &str,
    ) -> StateResult<Option<(ApplicationId, GroupId)>> {
        let Some(app) = self.get_application(application_id)? else {
            return Ok(None);
        };
        let Some(group) = self.get_group(group_id)? else {
            return Ok(None);
        };
        if group.application_id != app.id {
            return Ok(None);
        }
        Ok(Some((app.id, group.id)))
    }

    /// Read-modify-write a group inside one write transaction.
    ///
    /// Returns whether `apply` reported a change; unchanged groups are not
    /// rewritten.
    fn modify_group(
        &self,
        group_id: &str,
        apply: impl FnOnce(&mut Group) -> bool,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let changed;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut group: Group = match table.get(group_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("group {group_id}"))),
            };
            changed = apply(&mut group);
            if changed {
                let value = serde_json::to_vec(&group).map_err(map_err!(Serialize))?;
                table
                    .insert(group_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(changed)
    }

    /// Compare-and-set the group's rollout flag. Returns true only if the
    /// stored value actually changed, so concurrent callers racing to the
    /// same value see exactly one `true`.
    pub fn set_group_rollout_in_progress(
        &self,
        group_id: &str,
        in_progress: bool,
    ) -> StateResult<bool> {
        let changed = self.modify_group(group_id, |group| {
            if group.rollout_in_progress == in_progress {
                return false;
            }
            group.rollout_in_progress = in_progress;
            true
        })?;
        debug!(group = %group_id, in_progress, changed, "group rollout flag set");
        Ok(changed)
    }

    /// Disable further updates for a group. Returns true if they were enabled.
    pub fn disable_updates(&self, group_id: &str) -> StateResult<bool> {
        let changed = self.modify_group(group_id, |group| {
            let was_enabled = group.updates_enabled;
            group.updates_enabled = false;
            was_enabled
        })?;
        debug!(group = %group_id, changed, "group updates disabled");
        Ok(changed)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance record as-is.
    pub fn put_instance(&self, instance: &Instance) -> StateResult<()> {
        check_id("instance", &instance.id)?;
        check_id("application", &instance.application.application_id)?;
        self.put_record(INSTANCES, &instance.table_key(), instance)
    }

    pub fn get_instance(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> StateResult<Option<Instance>> {
        self.get_record(INSTANCES, &instance_key(application_id, instance_id))
    }

    pub fn list_instances_for_group(&self, group_id: &str) -> StateResult<Vec<Instance>> {
        self.scan_records(INSTANCES, |i: &Instance| i.application.group_id == group_id)
    }

    pub fn list_instances_for_application(
        &self,
        application_id: &str,
    ) -> StateResult<Vec<Instance>> {
        self.scan_records(INSTANCES, |i: &Instance| {
            i.application.application_id == application_id
        })
    }

    /// Record a check-in. On first contact the instance is created with
    /// status `Undefined`; afterwards only the reported facts (version, ip,
    /// group, check time) are refreshed.
    pub fn register_instance(
        &self,
        instance_id: &str,
        application_id: &str,
        group_id: &str,
        version: &str,
        ip: &str,
        at: u64,
    ) -> StateResult<Instance> {
        check_id("instance", instance_id)?;
        check_id("application", application_id)?;
        check_id("group", group_id)?;
        let key = instance_key(application_id, instance_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let instance;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let existing: Option<Instance> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            instance = match existing {
                Some(mut inst) => {
                    inst.ip = ip.to_string();
                    inst.application.group_id = group_id.to_string();
                    inst.application.version = version.to_string();
                    inst.application.last_check_at = at;
                    inst
                }
                None => {
                    debug!(instance = %instance_id, application = %application_id, "first contact");
                    Instance {
                        id: instance_id.to_string(),
                        ip: ip.to_string(),
                        alias: String::new(),
                        created_at: at,
                        application: InstanceApplication {
                            application_id: application_id.to_string(),
                            group_id: group_id.to_string(),
                            version: version.to_string(),
                            status: InstanceStatus::Undefined,
                            update_in_progress: false,
                            last_update_version: None,
                            last_check_at: at,
                            last_update_granted_at: None,
                        },
                    }
                }
            };
            let value = serde_json::to_vec(&instance).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(instance)
    }

    /// Read-modify-write an instance and append a status history row in
    /// the same transaction.
    fn modify_instance(
        &self,
        instance_id: &str,
        application_id: &str,
        at: u64,
        apply: impl FnOnce(&mut InstanceApplication),
    ) -> StateResult<Instance> {
        let key = instance_key(application_id, instance_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let instance;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut inst: Instance = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("instance {key}"))),
            };
            apply(&mut inst.application);
            let value = serde_json::to_vec(&inst).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            instance = inst;
        }
        append_history(&txn, &instance, at)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(instance)
    }

    /// Set an instance's update status. Statuses that end the update cycle
    /// also clear `update_in_progress`.
    pub fn update_instance_status(
        &self,
        instance_id: &str,
        application_id: &str,
        status: InstanceStatus,
        at: u64,
    ) -> StateResult<Instance> {
        let instance = self.modify_instance(instance_id, application_id, at, |app| {
            app.status = status;
            if status.ends_update_cycle() {
                app.update_in_progress = false;
            }
        })?;
        debug!(
            instance = %instance_id,
            application = %application_id,
            status = status.as_str(),
            "instance status updated"
        );
        Ok(instance)
    }

    /// Mark an update to `version` as granted to the instance.
    pub fn grant_update(
        &self,
        instance_id: &str,
        application_id: &str,
        version: &str,
        at: u64,
    ) -> StateResult<Instance> {
        let instance = self.modify_instance(instance_id, application_id, at, |app| {
            app.status = InstanceStatus::UpdateGranted;
            app.update_in_progress = true;
            app.last_update_version = Some(version.to_string());
            app.last_update_granted_at = Some(at);
        })?;
        debug!(instance = %instance_id, application = %application_id, %version, "update granted");
        Ok(instance)
    }

    pub fn list_status_history(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> StateResult<Vec<StatusHistoryEntry>> {
        let prefix = instance_prefix(application_id, instance_id);
        let end = prefix_end(&prefix);
        self.range_records(STATUS_HISTORY, &prefix, &end)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Map a protocol `(type, result)` pair to its internal id.
    pub fn lookup_event_type_id(
        &self,
        event_type: u32,
        event_result: u32,
    ) -> StateResult<Option<EventTypeId>> {
        let key = event_type_key(event_type, event_result);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENT_TYPES).map_err(map_err!(Table))?;
        let id = table
            .get(key.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| guard.value());
        Ok(id)
    }

    /// Append an event. Ids are allocated in the same transaction.
    pub fn record_event(&self, new: &NewEvent) -> StateResult<Event> {
        check_id("instance", &new.instance_id)?;
        check_id("application", &new.application_id)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let event = Event {
            id: next_id(&txn, EVENT_COUNTER)?,
            created_at: new.created_at,
            event_type_id: new.event_type_id,
            instance_id: new.instance_id.clone(),
            application_id: new.application_id.clone(),
            previous_version: new.previous_version.clone(),
            error_code: new.error_code.clone(),
        };
        let key = event.table_key();
        let value = serde_json::to_vec(&event).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, event_type = event.event_type_id, "event recorded");
        Ok(event)
    }

    /// All events of an instance, oldest first.
    pub fn list_events_for_instance(
        &self,
        instance_id: &str,
        application_id: &str,
    ) -> StateResult<Vec<Event>> {
        let prefix = instance_prefix(application_id, instance_id);
        let end = prefix_end(&prefix);
        self.range_records(EVENTS, &prefix, &end)
    }

    /// Error code of the newest event recorded at or before `at`.
    pub fn latest_error_code(
        &self,
        instance_id: &str,
        application_id: &str,
        at: u64,
    ) -> StateResult<Option<String>> {
        let prefix = instance_prefix(application_id, instance_id);
        let end = timestamp_end(&prefix, at);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut range = table
            .range::<&str>(prefix.as_str()..end.as_str())
            .map_err(map_err!(Read))?;
        match range.next_back() {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let event: Event =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(event.error_code))
            }
            None => Ok(None),
        }
    }

    // ── Activity ───────────────────────────────────────────────────

    pub fn append_activity(&self, new: &NewActivity) -> StateResult<Activity> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let activity = Activity {
            id: next_id(&txn, ACTIVITY_COUNTER)?,
            created_at: new.created_at,
            class: new.class,
            severity: new.severity,
            version: new.version.clone(),
            application_id: new.application_id.clone(),
            group_id: new.group_id.clone(),
            instance_id: new.instance_id.clone(),
        };
        let key = activity.table_key();
        let value = serde_json::to_vec(&activity).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(ACTIVITY).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(class = ?activity.class, group = %activity.group_id, "activity appended");
        Ok(activity)
    }

    /// Activity entries created within `[start, end]`, oldest first.
    pub fn list_activity(&self, start: u64, end: u64) -> StateResult<Vec<Activity>> {
        let from = ordered_key("", start, 0);
        let to = timestamp_end("", end);
        self.range_records(ACTIVITY, &from, &to)
    }
}

fn event_type_key(event_type: u32, event_result: u32) -> String {
    format!("{event_type}:{event_result}")
}

/// Smallest key greater than every key starting with `prefix`, given that
/// prefixes end in `:`.
fn prefix_end(prefix: &str) -> String {
    let trimmed = prefix.strip_suffix(':').unwrap_or(prefix);
    format!("{trimmed};")
}

/// Smallest key greater than every ordered key under `prefix` whose
/// timestamp is at most `at`.
fn timestamp_end(prefix: &str, at: u64) -> String {
    format!("{prefix}{at:016};")
}

fn next_id(txn: &WriteTransaction, counter: &str) -> StateResult<u64> {
    let mut table = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
    let next = table
        .get(counter)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0)
        + 1;
    table.insert(counter, next).map_err(map_err!(Write))?;
    Ok(next)
}

fn check_id(kind: &str, id: &str) -> StateResult<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(StateError::InvalidId(format!(
            "{kind} id {id:?} must be non-empty and must not contain '{KEY_SEPARATOR}'"
        )))
    }
}

fn append_history(txn: &WriteTransaction, instance: &Instance, at: u64) -> StateResult<()> {
    let app = &instance.application;
    let entry = StatusHistoryEntry {
        created_at: at,
        instance_id: instance.id.clone(),
        application_id: app.application_id.clone(),
        status: app.status,
        version: app.last_update_version.clone(),
    };
    let id = next_id(txn, HISTORY_COUNTER)?;
    let key = ordered_key(&instance_prefix(&app.application_id, &instance.id), at, id);
    let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(STATUS_HISTORY).map_err(map_err!(Table))?;
    table
        .insert(key.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

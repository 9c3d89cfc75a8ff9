//! Event validation: checks an event's application/group/instance binding
//! and that the instance is expecting progress events.

use tracing::debug;
use updraft_state::{ApplicationId, GroupId, Instance};

use crate::error::{EventError, EventResult};
use crate::fleet::FleetStore;

/// A binding that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub application_id: ApplicationId,
    pub group_id: GroupId,
    pub instance: Instance,
}

/// Resolve the application and group and check the instance against them.
///
/// Store failures surface as [`EventError::Store`]; missing records map to
/// the taxonomy.
pub fn validate<S: FleetStore + ?Sized>(
    store: &S,
    instance_id: &str,
    application_id: &str,
    group_id: &str,
) -> EventResult<Validated> {
    let Some((application_id, group_id)) =
        store.resolve_application_and_group(application_id, group_id)?
    else {
        return Err(EventError::InvalidApplicationOrGroup);
    };

    let Some(instance) = store.get_instance(instance_id, &application_id)? else {
        debug!(
            instance = %instance_id,
            application = %application_id,
            "unknown instance, possibly a first contact"
        );
        return Err(EventError::InvalidInstance);
    };

    if instance.application.application_id != application_id {
        return Err(EventError::InvalidApplicationOrGroup);
    }

    if !instance.application.update_in_progress {
        debug!(
            instance = %instance_id,
            application = %application_id,
            "dropping event, no update in progress"
        );
        return Err(EventError::NoUpdateInProgress);
    }

    Ok(Validated {
        application_id,
        group_id,
        instance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn accepts_instance_with_update_in_progress() {
        let store = seeded_store(2);
        grant(&store, APP, GROUP, "i0");

        let validated = validate(&store, "i0", APP, GROUP).unwrap();
        assert_eq!(validated.application_id, APP);
        assert_eq!(validated.group_id, GROUP);
        assert_eq!(validated.instance.id, "i0");
    }

    #[test]
    fn rejects_group_of_another_application() {
        let store = seeded_store(1);
        grant(&store, APP, GROUP, "i0");

        let err = validate(&store, "i0", APP, REBOOT_GROUP).unwrap_err();
        assert!(matches!(err, EventError::InvalidApplicationOrGroup));
    }

    #[test]
    fn rejects_unknown_application_or_group() {
        let store = seeded_store(1);
        assert!(matches!(
            validate(&store, "i0", "ghost", GROUP).unwrap_err(),
            EventError::InvalidApplicationOrGroup
        ));
        assert!(matches!(
            validate(&store, "i0", APP, "ghost").unwrap_err(),
            EventError::InvalidApplicationOrGroup
        ));
    }

    #[test]
    fn unknown_instance_is_invalid_instance() {
        let store = seeded_store(1);
        let err = validate(&store, "never-seen", APP, GROUP).unwrap_err();
        assert!(matches!(err, EventError::InvalidInstance));
        assert!(err.is_expected());
    }

    #[test]
    fn instance_without_grant_has_no_update_in_progress() {
        let store = seeded_store(1);
        let err = validate(&store, "i0", APP, GROUP).unwrap_err();
        assert!(matches!(err, EventError::NoUpdateInProgress));
    }
}

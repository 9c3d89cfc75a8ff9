//! Event classification: maps protocol `(type, result)` pairs onto the
//! supported event type table.

use updraft_core::{EventKind, EventTypeId, ProtocolResult};

use crate::error::{EventError, EventResult};
use crate::fleet::FleetStore;

/// A supported event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub event_type_id: EventTypeId,
    pub kind: EventKind,
    pub result: ProtocolResult,
}

/// Look up the pair in the store's event type table. Pairs outside the
/// supported subset fail with [`EventError::InvalidEventTypeOrResult`].
pub fn classify<S: FleetStore + ?Sized>(
    store: &S,
    event_type: u32,
    event_result: u32,
) -> EventResult<Classification> {
    let event_type_id = store
        .lookup_event_type_id(event_type, event_result)?
        .ok_or(EventError::InvalidEventTypeOrResult)?;
    let kind =
        EventKind::try_from(event_type).map_err(|_| EventError::InvalidEventTypeOrResult)?;
    let result =
        ProtocolResult::try_from(event_result).map_err(|_| EventError::InvalidEventTypeOrResult)?;
    Ok(Classification {
        event_type_id,
        kind,
        result,
    })
}

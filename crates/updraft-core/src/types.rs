//! Omaha protocol codes shared across Updraft crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application id of the Flatcar Container Linux updater.
///
/// Its instances only count an update as complete after a reboot.
pub const FLATCAR_APP_ID: &str = "e96281a6-d1af-4bde-9a0a-97b76e56dc57";

/// Previous-version sentinel sent by updaters that don't know what they
/// updated from. `"0.0.0"` is not a sentinel: it is used for forced updates.
pub const UNKNOWN_PREVIOUS_VERSION: &str = "0.0.0.0";

/// Internal identifier of a supported `(type, result)` pair.
pub type EventTypeId = u32;

/// Omaha event types understood by Updraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The update process finished; the result says how.
    UpdateComplete,
    /// The instance started downloading the update package.
    DownloadStarted,
    /// The update package was downloaded.
    DownloadFinished,
    /// The update package was installed.
    Installed,
}

impl EventKind {
    /// Wire code of this event type.
    pub const fn code(self) -> u32 {
        match self {
            EventKind::UpdateComplete => 3,
            EventKind::DownloadStarted => 13,
            EventKind::DownloadFinished => 14,
            EventKind::Installed => 800,
        }
    }
}

impl TryFrom<u32> for EventKind {
    type Error = ProtocolError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            3 => Ok(EventKind::UpdateComplete),
            13 => Ok(EventKind::DownloadStarted),
            14 => Ok(EventKind::DownloadFinished),
            800 => Ok(EventKind::Installed),
            other => Err(ProtocolError::UnknownEventType(other)),
        }
    }
}

/// Omaha event results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolResult {
    Failed,
    Success,
    /// Success confirmed after a reboot. Only meaningful with
    /// [`EventKind::UpdateComplete`].
    SuccessReboot,
}

impl ProtocolResult {
    pub const fn code(self) -> u32 {
        match self {
            ProtocolResult::Failed => 0,
            ProtocolResult::Success => 1,
            ProtocolResult::SuccessReboot => 2,
        }
    }
}

impl TryFrom<u32> for ProtocolResult {
    type Error = ProtocolError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ProtocolResult::Failed),
            1 => Ok(ProtocolResult::Success),
            2 => Ok(ProtocolResult::SuccessReboot),
            other => Err(ProtocolError::UnknownResult(other)),
        }
    }
}

/// Errors decoding raw protocol codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown event type code: {0}")]
    UnknownEventType(u32),

    #[error("unknown event result code: {0}")]
    UnknownResult(u32),
}

/// One row of the fixed event type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventTypeDef {
    pub id: EventTypeId,
    pub kind: EventKind,
    pub result: ProtocolResult,
    pub description: &'static str,
}

/// The subset of the Omaha protocol Updraft accepts.
pub const SUPPORTED_EVENT_TYPES: [EventTypeDef; 6] = [
    EventTypeDef {
        id: 1,
        kind: EventKind::UpdateComplete,
        result: ProtocolResult::Failed,
        description: "Instance reported an error during an update step.",
    },
    EventTypeDef {
        id: 2,
        kind: EventKind::UpdateComplete,
        result: ProtocolResult::Success,
        description: "Updater has processed and applied package.",
    },
    EventTypeDef {
        id: 3,
        kind: EventKind::UpdateComplete,
        result: ProtocolResult::SuccessReboot,
        description: "Instance upgraded to current channel version.",
    },
    EventTypeDef {
        id: 4,
        kind: EventKind::DownloadStarted,
        result: ProtocolResult::Success,
        description: "Downloading latest version.",
    },
    EventTypeDef {
        id: 5,
        kind: EventKind::DownloadFinished,
        result: ProtocolResult::Success,
        description: "Update package arrived successfully.",
    },
    EventTypeDef {
        id: 6,
        kind: EventKind::Installed,
        result: ProtocolResult::Success,
        description: "Install success. Update completion prevented by instance.",
    },
];

/// Look up a table row by its internal id.
pub fn event_type_def(id: EventTypeId) -> Option<&'static EventTypeDef> {
    SUPPORTED_EVENT_TYPES.iter().find(|def| def.id == id)
}

/// True if `previous_version` carries no usable information.
pub fn is_unknown_previous_version(previous_version: &str) -> bool {
    previous_version.is_empty() || previous_version == UNKNOWN_PREVIOUS_VERSION
}

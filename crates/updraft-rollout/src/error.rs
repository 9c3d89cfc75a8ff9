//! Error taxonomy for event registration and update granting.

use thiserror::Error;
use updraft_state::StateError;

/// Result type alias for registration and granting.
pub type EventResult<T> = Result<T, EventError>;

/// Outcomes that stop an event (or grant) before or at the durability
/// boundary. Anything that goes wrong after the event is recorded is
/// logged instead.
#[derive(Debug, Error)]
pub enum EventError {
    /// Unknown instance. Expected on an instance's first contact.
    #[error("invalid instance")]
    InvalidInstance,

    #[error("invalid application or group")]
    InvalidApplicationOrGroup,

    /// The `(type, result)` pair is outside the supported protocol subset.
    #[error("invalid event type or result")]
    InvalidEventTypeOrResult,

    #[error("event registration failed: {0}")]
    EventRegistrationFailed(#[source] StateError),

    /// The instance has no granted update, so the event is stale or
    /// spurious. Dropped without touching state.
    #[error("no update in progress")]
    NoUpdateInProgress,

    /// A reboot-completion instance reported completion without a usable
    /// previous version. Intentionally dropped, not a failure.
    #[error("flatcar event ignored")]
    FlatcarEventIgnored,

    #[error("updates disabled for group {0}")]
    UpdatesDisabled(String),

    #[error("group {0} has no target version")]
    NoTargetVersion(String),

    #[error("instance already at version {0}")]
    AlreadyUpToDate(String),

    #[error("update already in progress on instance")]
    UpdateAlreadyInProgress,

    #[error("state store error: {0}")]
    Store(#[from] StateError),
}

impl EventError {
    /// Outcomes that are part of normal fleet traffic rather than faults.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            EventError::InvalidInstance
                | EventError::NoUpdateInProgress
                | EventError::FlatcarEventIgnored
        )
    }
}

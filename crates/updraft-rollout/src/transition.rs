//! Instance state machine: maps reported events to instance statuses.

use updraft_core::{EventKind, ProtocolResult, RolloutConfig, is_unknown_previous_version};
use updraft_state::{Application, InstanceStatus};

/// How an instance proves an update completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// `Success` or `SuccessReboot` both complete the update.
    Plain,
    /// Only `SuccessReboot` completes the update; the instance must show
    /// it actually rebooted into the new version.
    RebootRequired,
}

impl CompletionPolicy {
    /// The application's own capability flag, or the configured list.
    pub fn resolve(
        application_id: &str,
        application: Option<&Application>,
        config: &RolloutConfig,
    ) -> Self {
        let flagged = application.is_some_and(|app| app.requires_reboot_completion);
        if flagged || config.requires_reboot_completion(application_id) {
            CompletionPolicy::RebootRequired
        } else {
            CompletionPolicy::Plain
        }
    }

    /// Whether `result` on an `UpdateComplete` event counts as success.
    pub fn accepts_completion(self, result: ProtocolResult) -> bool {
        match result {
            ProtocolResult::SuccessReboot => true,
            ProtocolResult::Success => self == CompletionPolicy::Plain,
            ProtocolResult::Failed => false,
        }
    }
}

/// The status an event moves its instance to, if any.
///
/// `None` means the event is recorded but has no status consequence (a
/// plain `Success` completion on a reboot-required instance).
pub fn next_status(
    kind: EventKind,
    result: ProtocolResult,
    policy: CompletionPolicy,
) -> Option<InstanceStatus> {
    if result == ProtocolResult::Failed {
        return Some(InstanceStatus::Error);
    }
    match (kind, result) {
        (EventKind::UpdateComplete, r) if policy.accepts_completion(r) => {
            Some(InstanceStatus::Complete)
        }
        (EventKind::DownloadStarted, ProtocolResult::Success) => Some(InstanceStatus::Downloading),
        (EventKind::DownloadFinished, ProtocolResult::Success) => Some(InstanceStatus::Downloaded),
        (EventKind::Installed, ProtocolResult::Success) => Some(InstanceStatus::Installed),
        _ => None,
    }
}

/// A reboot completion from an instance that cannot say what it updated
/// from. Such an instance was never really moved by the current grant (it
/// was likely already on the target version), so it must not count toward
/// rollout success.
pub fn is_stale_reboot_completion(
    kind: EventKind,
    result: ProtocolResult,
    previous_version: &str,
    policy: CompletionPolicy,
) -> bool {
    policy == CompletionPolicy::RebootRequired
        && kind == EventKind::UpdateComplete
        && result == ProtocolResult::SuccessReboot
        && is_unknown_previous_version(previous_version)
}

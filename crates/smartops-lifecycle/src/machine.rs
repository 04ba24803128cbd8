//! App status state machine.
//!
//! ```text
//! CREATING_STEP_0 ─► .._1 ─► .._2 ─► .._3 ─► .._4 ─► PLANNING ─► PLAN_GENERATED ─► LAUNCHING ─► LAUNCHED
//!                                                        │                              │
//!                                                        └──────────► ERROR ◄───────────┘
//! DELETING ─► DELETED
//! ```
//!
//! Transitions are only ever side effects of handler operations. The step
//! order above is what the handlers produce; the machine itself enforces two
//! rules: `ERROR` is absorbing until an operator reset, and an
//! error-severity transition touching an in-flight state lands in `ERROR`.

use smartops_state::{AppId, AppState, AppStatus, Severity, Status, WriteTxn, epoch_secs};
use tracing::{debug, info};

use crate::error::{LifecycleError, LifecycleResult};

/// Message written by an operator reset.
pub const RESET_MESSAGE: &str = "Status reset by operator";

/// A requested status change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: AppState,
    pub message: String,
    pub severity: Severity,
}

impl Transition {
    pub fn new(state: AppState, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            state,
            message: message.into(),
            severity,
        }
    }

    pub fn info(state: AppState, message: impl Into<String>) -> Self {
        Self::new(state, message, Severity::Info)
    }

    pub fn warning(state: AppState, message: impl Into<String>) -> Self {
        Self::new(state, message, Severity::Warning)
    }

    pub fn error(state: AppState, message: impl Into<String>) -> Self {
        Self::new(state, message, Severity::Error)
    }
}

/// Whether an app in `state` may be edited or deleted.
///
/// False exactly for the in-flight states, whose wire names end in `ING`:
/// `PLANNING`, `LAUNCHING` and `DELETING`. The numbered `CREATING_STEP_*`
/// states do not block edits.
pub fn is_editable(state: AppState) -> bool {
    !state.as_str().ends_with("ING")
}

/// States in which a deployment action is running.
pub fn is_in_flight(state: AppState) -> bool {
    matches!(state, AppState::Planning | AppState::Launching)
}

/// Reject mutation of an app that is mid-action.
pub fn ensure_editable(app_name: &str, status: &Status) -> LifecycleResult<()> {
    if is_editable(status.state) {
        Ok(())
    } else {
        Err(LifecycleError::NotEditable(format!(
            "app {app_name} is not editable or deletable when status is {}",
            status.state
        )))
    }
}

/// Compute the status that results from applying `transition` to `current`.
pub fn apply(app_id: AppId, current: &Status, transition: Transition) -> LifecycleResult<Status> {
    if current.state == AppState::Error && transition.state != AppState::Error {
        return Err(LifecycleError::Absorbed(app_id));
    }

    let forced = transition.severity == Severity::Error
        && (is_in_flight(current.state) || is_in_flight(transition.state));
    let state = if forced { AppState::Error } else { transition.state };

    Ok(Status {
        state,
        message: transition.message,
        severity: transition.severity,
        updated_at: epoch_secs(),
    })
}

/// The status written by an operator reset. Valid from any state.
pub fn reset() -> Status {
    Status {
        message: RESET_MESSAGE.to_string(),
        ..Status::default()
    }
}

/// Apply a transition to the stored status of `app_id` inside `txn`.
pub(crate) fn transition(
    txn: &mut WriteTxn,
    app_id: AppId,
    transition: Transition,
) -> LifecycleResult<Status> {
    let mut record: AppStatus = txn.require(app_id)?;
    let from = record.status.state;
    record.status = apply(app_id, &record.status, transition)?;
    txn.put(&record)?;

    if record.status.state == AppState::Error {
        info!(app_id, %from, message = %record.status.message, "app entered ERROR");
    } else {
        debug!(app_id, %from, to = %record.status.state, "status transition");
    }
    Ok(record.status)
}

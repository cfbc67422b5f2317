//! Element status and the aggregation rule for composite elements.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Status of a plan element.
///
/// Steps move `PENDING -> PREPARED -> STARTING -> COMPLETE` (or `IN_PROGRESS`
/// once operations have been issued). `WAITING` marks operator-held work and
/// `ERROR` is terminal until the element is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Error,
    Waiting,
    Pending,
    Prepared,
    Starting,
    InProgress,
    Complete,
}

impl Status {
    /// Work has been handed out and is not yet finished
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Prepared | Self::Starting | Self::InProgress)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Statuses the plan scheduler will hand offers to
    pub fn accepts_offers(&self) -> bool {
        matches!(self, Self::Pending | Self::Prepared)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Waiting => "WAITING",
            Self::Pending => "PENDING",
            Self::Prepared => "PREPARED",
            Self::Starting => "STARTING",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a composite element as a pure function of its children.
///
/// Precedence, first match wins:
/// 1. own errors or any `ERROR` child -> `ERROR`
/// 2. no children -> `COMPLETE`
/// 3. any `IN_PROGRESS`, `STARTING` or `PREPARED` child -> `IN_PROGRESS`
/// 4. any `WAITING` child -> `WAITING`
/// 5. all `COMPLETE` -> `COMPLETE`
/// 6. parent interrupted -> `WAITING`
/// 7. all `PENDING` -> `PENDING`
/// 8. only `COMPLETE` and `PENDING` -> `IN_PROGRESS`
/// 9. anything else -> `ERROR`, logged as an invariant violation
pub fn aggregate_status(
    name: &str,
    children: &[Status],
    has_errors: bool,
    interrupted: bool,
) -> Status {
    let any = |status: Status| children.iter().any(|s| *s == status);
    let all = |status: Status| children.iter().all(|s| *s == status);

    if has_errors || any(Status::Error) {
        Status::Error
    } else if children.is_empty() {
        Status::Complete
    } else if children.iter().any(Status::is_running) {
        Status::InProgress
    } else if any(Status::Waiting) {
        Status::Waiting
    } else if all(Status::Complete) {
        Status::Complete
    } else if interrupted {
        Status::Waiting
    } else if all(Status::Pending) {
        Status::Pending
    } else if children
        .iter()
        .all(|s| matches!(s, Status::Complete | Status::Pending))
    {
        Status::InProgress
    } else {
        error!(
            element = %name,
            children = ?children,
            "Unexpected combination of child statuses, reporting ERROR"
        );
        Status::Error
    }
}

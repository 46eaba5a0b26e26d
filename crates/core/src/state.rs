//! Work lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a work unit.
///
/// ```text
/// Submitted -> Queued -> Dequeued -> Started -> Completed
///                 |          |
///                 +----------+-----> TimedOut
///                 +----------------> Cancelled
/// ```
///
/// The declaration order is meaningful: every state at or after `Started`
/// means the submitter no longer waits for a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkState {
    /// Accepted by the work manager, not yet queued
    Submitted,
    /// Waiting in the work queue
    Queued,
    /// Taken off the queue by a worker
    Dequeued,
    /// Executing on a worker
    Started,
    /// Execution finished (successfully or not)
    Completed,
    /// Start timeout elapsed before the unit started
    TimedOut,
    /// Dropped from the queue at shutdown
    Cancelled,
}

impl WorkState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Cancelled)
    }

    /// Whether the unit has started or can no longer start.
    pub fn is_past_start(self) -> bool {
        self >= Self::Started
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkState::Submitted => write!(f, "submitted"),
            WorkState::Queued => write!(f, "queued"),
            WorkState::Dequeued => write!(f, "dequeued"),
            WorkState::Started => write!(f, "started"),
            WorkState::Completed => write!(f, "completed"),
            WorkState::TimedOut => write!(f, "timed-out"),
            WorkState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How long a submitter waits after handing over a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitMode {
    /// Return once the unit is queued
    NoWait,
    /// Return once the unit started
    UntilStart,
    /// Return once the unit finished
    UntilFinish,
}

//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Defined -> Scheduled -> Running -> Successful
/// - Defined -> Scheduled -> Running -> Unsuccessful
/// - Scheduled -> Unsuccessful (a required task failed or was cancelled)
/// - Defined | Scheduled | Running -> Cancelled
///
/// Successful, Unsuccessful and Cancelled are terminal: nothing moves out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, never asked to run.
    Defined,

    /// Waiting for its required tasks and a scheduling pass.
    Scheduled,

    /// A worker is executing the target method.
    Running,

    Successful,

    Unsuccessful,

    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Successful | TaskStatus::Unsuccessful | TaskStatus::Cancelled
        )
    }

    /// Did this task end in a way that blocks anything depending on it?
    pub fn is_failed(self) -> bool {
        matches!(self, TaskStatus::Unsuccessful | TaskStatus::Cancelled)
    }

    /// Is `self -> next` a legal transition?
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Defined, Scheduled)
                | (Scheduled, Running)
                | (Scheduled, Unsuccessful)
                | (Running, Successful)
                | (Running, Unsuccessful)
                | (Defined, Cancelled)
                | (Scheduled, Cancelled)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Defined => "defined",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Successful => "successful",
            TaskStatus::Unsuccessful => "unsuccessful",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

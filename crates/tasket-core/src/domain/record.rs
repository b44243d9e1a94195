//! Task record: the persisted unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duration::format_duration;
use super::ids::TaskId;
use super::status::TaskStatus;
use super::target::TargetRef;

/// Format used for dates in the complete log.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One invocation of a registered method against one target object.
///
/// Design:
/// - At most one non-archived record exists per (target_type, target_key, method).
/// - `status` only changes through the store's compare-and-set.
/// - `log` is append-only and stays empty until the task starts running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub target: TargetRef,
    pub method: String,
    pub status: TaskStatus,

    /// Copied from the registry when the record is created.
    pub description: String,

    pub log: String,

    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,

    /// Set once a newer record for the same triple has been created.
    pub archived: bool,

    /// Current records of the transitive prerequisites, in dependency order.
    pub required_task_ids: Vec<TaskId>,

    /// The record this one archived when it was created.
    pub supersedes: Option<TaskId>,

    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Human readable run time, if the task both started and ended.
    pub fn duration(&self) -> Option<String> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some(format_duration(end - start)),
            _ => None,
        }
    }

    /// This record's section of a complete log:
    ///
    /// ```text
    /// <description> started on <start>
    /// <log>
    /// <description> finished successfully on <end>
    /// ```
    ///
    /// Missing dates drop their `" on <date>"` suffix, an empty log adds no
    /// line, and the finished line only appears once the task is terminal.
    pub fn narrative(&self) -> String {
        let mut lines = Vec::with_capacity(3);
        lines.push(format!(
            "{} started{}",
            self.description,
            on_date(self.start_date)
        ));
        if !self.log.is_empty() {
            lines.push(self.log.clone());
        }
        if self.status.is_terminal() {
            let outcome = if self.status == TaskStatus::Successful {
                "successfully"
            } else {
                "with error"
            };
            lines.push(format!(
                "{} finished {}{}",
                self.description,
                outcome,
                on_date(self.end_date)
            ));
        }
        lines.join("\n")
    }

    pub fn matches(&self, target: &TargetRef, method: &str) -> bool {
        self.target == *target && self.method == method
    }
}

fn on_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| format!(" on {}", d.format(DATE_FORMAT)))
        .unwrap_or_default()
}

/// Everything the store needs to create a record; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub target: TargetRef,
    pub method: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A status transition plus the timestamps that go with it.
///
/// `None` dates leave the stored value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            start_date: None,
            end_date: None,
        }
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.start_date = Some(at);
        self
    }

    pub fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.end_date = Some(at);
        self
    }

    /// Apply to a record. Callers have already checked the transition.
    pub fn apply(&self, record: &mut TaskRecord) {
        record.status = self.status;
        if let Some(start) = self.start_date {
            record.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            record.end_date = Some(end);
        }
    }
}

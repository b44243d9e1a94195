//! Errors raised synchronously to callers of the task API.
//!
//! Failures inside a running target method are not errors here: they end up in
//! the task log and the task's `unsuccessful` status.

use super::ids::TaskId;
use super::status::TaskStatus;
use super::target::TargetRef;

/// TaskError is what the task manager returns.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Method '{method}' not registered for model '{target_type}'")]
    NotRegistered { method: String, target_type: String },

    #[error("Unknown target type '{0}'")]
    UnknownTargetType(String),

    /// The loader could not produce the object; the message is the loader's own.
    #[error("{message}")]
    ObjectNotFound { target: TargetRef, message: String },

    #[error("Cycle detected in required tasks: {}", chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    #[error("Cannot {action} task {id} in status \"{from}\"")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        action: &'static str,
    },

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// StoreError comes from a `TaskStore` backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Task matching query does not exist: {0}")]
    NotFound(TaskId),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl TaskError {
    /// Map a store miss on `id` to `TaskNotFound`, pass everything else through.
    pub fn from_store(id: TaskId, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(missing) if missing == id => TaskError::TaskNotFound(id),
            other => TaskError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_message() {
        let err = TaskError::NotRegistered {
            method: "run_a_method_that_is_not_registered".to_string(),
            target_type: "tasket.tests.TestModel".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Method 'run_a_method_that_is_not_registered' not registered for model 'tasket.tests.TestModel'"
        );
    }

    #[test]
    fn cycle_message_lists_chain() {
        let err = TaskError::CycleDetected {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cycle detected in required tasks: a -> b -> a");
    }

    #[test]
    fn store_miss_becomes_task_not_found() {
        let id = TaskId::new(7);
        let err = TaskError::from_store(id, StoreError::NotFound(id));
        assert!(matches!(err, TaskError::TaskNotFound(found) if found == id));

        let other = TaskError::from_store(id, StoreError::Backend("boom".into()));
        assert!(matches!(other, TaskError::Store(StoreError::Backend(_))));
    }
}

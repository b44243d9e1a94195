//! TaskManager - タスク API の表面
//!
//! 作成・実行要求・キャンセル・参照はすべてここを通る。状態遷移は
//! compare-and-set で行い、実行系の遷移（running 以降）はスケジューラと
//! Executor に任せる。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::scheduler::Scheduler;
use crate::domain::{
    NewTask, StatusUpdate, StoreError, TargetRef, TaskError, TaskId, TaskRecord, TaskStatus,
};
use crate::ports::{ArtifactStore, Clock, TaskStore};
use crate::typed::TaskRegistry;

pub struct TaskManager {
    registry: Arc<TaskRegistry>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    scheduler: Scheduler,
}

impl TaskManager {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            artifacts,
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Create a fresh `defined` record for (target_type, target_key, method),
    /// archiving the current one. Required tasks are reused when a current
    /// record exists and created otherwise.
    pub async fn create_task(
        &self,
        target_type: &str,
        target_key: &str,
        method: &str,
    ) -> Result<TaskRecord, TaskError> {
        let target = TargetRef::new(target_type, target_key);
        let required = self.validate(&target, method)?;
        let chain = self.current_chain(&target, &required, false).await?;
        let record = self
            .insert(&target, method, chain.iter().map(|r| r.id).collect())
            .await?;
        debug!(task = %record.id, target = %target, method, "task created");
        Ok(record)
    }

    /// The current record for the triple, created if there is none.
    pub async fn task_for_object(
        &self,
        target_type: &str,
        target_key: &str,
        method: &str,
    ) -> Result<TaskRecord, TaskError> {
        let target = TargetRef::new(target_type, target_key);
        self.validate(&target, method)?;
        match self.store.find_current(&target, method).await? {
            Some(record) => Ok(record),
            None => self.create_task(target_type, target_key, method).await,
        }
    }

    /// `task_for_object` for every method of the type, in registration order.
    pub async fn tasks_for_object(
        &self,
        target_type: &str,
        target_key: &str,
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let methods: Vec<String> = self
            .registry
            .defined_tasks_for(target_type)?
            .into_iter()
            .map(|def| def.method.clone())
            .collect();

        let mut records = Vec::with_capacity(methods.len());
        for method in methods {
            records.push(self.task_for_object(target_type, target_key, &method).await?);
        }
        Ok(records)
    }

    /// Request a run.
    ///
    /// - `defined`: scheduled, along with every required task that has not
    ///   succeeded. Failed or cancelled required tasks are replaced by fresh
    ///   records first.
    /// - `scheduled`: nothing to do.
    /// - terminal: a fresh record for the same triple is created and scheduled.
    /// - `running` or archived: `InvalidTransition`.
    ///
    /// Returns the record that is now scheduled.
    pub async fn run_task(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        let record = self.get_task(id).await?;
        if record.archived {
            return Err(TaskError::InvalidTransition {
                id,
                from: record.status,
                action: "run archived",
            });
        }
        match record.status {
            TaskStatus::Scheduled => return Ok(record),
            TaskStatus::Running => {
                return Err(TaskError::InvalidTransition {
                    id,
                    from: record.status,
                    action: "run",
                });
            }
            _ => {}
        }

        let target = record.target.clone();
        let required = self.registry.resolve(&target.target_type, &record.method)?;
        let chain = self.current_chain(&target, &required, true).await?;
        let required_ids: Vec<TaskId> = chain.iter().map(|r| r.id).collect();

        let root = if record.status == TaskStatus::Defined {
            if record.required_task_ids != required_ids {
                self.store.set_required(id, required_ids).await?;
            }
            record
        } else {
            let fresh = self.insert(&target, &record.method, required_ids).await?;
            debug!(task = %fresh.id, previous = %id, "re-running as a new task");
            fresh
        };

        for required in chain.iter().filter(|r| r.status == TaskStatus::Defined) {
            self.schedule(required.id).await?;
        }
        if !self.schedule(root.id).await? {
            let current = self.get_task(root.id).await?;
            if current.status != TaskStatus::Scheduled {
                return Err(TaskError::InvalidTransition {
                    id: root.id,
                    from: current.status,
                    action: "run",
                });
            }
        }

        self.scheduler.notify();
        self.get_task(root.id).await
    }

    /// Cancel a task.
    ///
    /// `defined` and `scheduled` tasks are cancelled on the spot and keep an
    /// empty log. A `running` task is marked cancelled right away and its
    /// worker is interrupted by the next scheduling pass.
    pub async fn cancel_task(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        loop {
            let record = self.get_task(id).await?;
            if record.status.is_terminal() {
                return Err(TaskError::InvalidTransition {
                    id,
                    from: record.status,
                    action: "cancel",
                });
            }

            let update = StatusUpdate::to(TaskStatus::Cancelled).ended_at(self.clock.now());
            let swapped = self
                .store
                .compare_and_set_status(id, record.status, update)
                .await
                .map_err(|err| TaskError::from_store(id, err))?;
            if !swapped {
                // Status moved under us; look again.
                continue;
            }

            debug!(task = %id, from = %record.status, "task cancelled");
            if record.status == TaskStatus::Running {
                self.scheduler.notify();
            }
            return self.get_task(id).await;
        }
    }

    /// Narratives of the required tasks (dependency order) followed by the
    /// task's own.
    pub async fn complete_log(&self, id: TaskId) -> Result<String, TaskError> {
        let record = self.get_task(id).await?;
        let mut sections: Vec<String> = self
            .required_tasks(id)
            .await?
            .iter()
            .map(TaskRecord::narrative)
            .collect();
        sections.push(record.narrative());
        Ok(sections.join("\n"))
    }

    /// Records of the task's required tasks, in dependency order. Deleted ones
    /// are skipped.
    pub async fn required_tasks(&self, id: TaskId) -> Result<Vec<TaskRecord>, TaskError> {
        let record = self.get_task(id).await?;
        let mut required = Vec::with_capacity(record.required_task_ids.len());
        for required_id in record.required_task_ids {
            match self.store.get(required_id).await {
                Ok(r) => required.push(r),
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(required)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        self.store
            .get(id)
            .await
            .map_err(|err| TaskError::from_store(id, err))
    }

    /// Remove the record and its log artifact. A running worker is
    /// interrupted by the next scheduling pass.
    pub async fn delete_task(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        let record = self
            .store
            .delete(id)
            .await
            .map_err(|err| TaskError::from_store(id, err))?;
        if let Some(artifacts) = &self.artifacts
            && let Err(err) = artifacts.remove(id).await
        {
            warn!(task = %id, error = %err, "failed to remove task log artifact");
        }
        if record.status == TaskStatus::Running {
            self.scheduler.notify();
        }
        info!(task = %id, "task deleted");
        Ok(record)
    }

    /// Registration, the object, and the dependency chain. Returns the
    /// resolved required methods.
    fn validate(&self, target: &TargetRef, method: &str) -> Result<Vec<String>, TaskError> {
        self.registry.lookup(&target.target_type, method)?;
        let required = self.registry.resolve(&target.target_type, method)?;
        self.registry.load(target)?;
        Ok(required)
    }

    /// `defined` → `scheduled`. `false` if the task was no longer defined.
    async fn schedule(&self, id: TaskId) -> Result<bool, TaskError> {
        self.store
            .compare_and_set_status(id, TaskStatus::Defined, StatusUpdate::to(TaskStatus::Scheduled))
            .await
            .map_err(|err| TaskError::from_store(id, err))
    }

    /// Current records of `methods` (dependency order), creating the missing
    /// ones. With `replace_failed`, unsuccessful or cancelled records are
    /// replaced by fresh ones. Reused records get their required ids pointed
    /// at the current chain.
    async fn current_chain(
        &self,
        target: &TargetRef,
        methods: &[String],
        replace_failed: bool,
    ) -> Result<Vec<TaskRecord>, TaskError> {
        let mut ids: HashMap<&str, TaskId> = HashMap::with_capacity(methods.len());
        let mut chain = Vec::with_capacity(methods.len());

        for method in methods {
            // Prerequisites of `method` precede it in `methods`.
            let required_ids: Vec<TaskId> = self
                .registry
                .resolve(&target.target_type, method)?
                .iter()
                .filter_map(|m| ids.get(m.as_str()).copied())
                .collect();

            let record = match self.store.find_current(target, method).await? {
                Some(record) if !(replace_failed && record.status.is_failed()) => {
                    if record.status == TaskStatus::Defined && record.required_task_ids != required_ids {
                        self.store.set_required(record.id, required_ids).await?;
                    }
                    record
                }
                _ => self.insert(target, method, required_ids).await?,
            };
            ids.insert(method.as_str(), record.id);
            chain.push(record);
        }
        Ok(chain)
    }

    async fn insert(
        &self,
        target: &TargetRef,
        method: &str,
        required_ids: Vec<TaskId>,
    ) -> Result<TaskRecord, TaskError> {
        let def = self.registry.lookup(&target.target_type, method)?;
        let mut record = self
            .store
            .create(NewTask {
                target: target.clone(),
                method: method.to_string(),
                description: def.description.clone(),
                created_at: self.clock.now(),
            })
            .await?;
        if let Some(previous) = record.supersedes {
            debug!(task = %record.id, previous = %previous, "previous task archived");
        }
        if !required_ids.is_empty() {
            self.store.set_required(record.id, required_ids.clone()).await?;
            record.required_task_ids = required_ids;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::testing::{test_time, Harness, TestModel};
    use crate::typed::Target;

    const TYPE: &str = TestModel::TYPE;

    #[tokio::test]
    async fn test_invalid_method() {
        let h = Harness::new();
        let err = h
            .app
            .manager
            .create_task(TYPE, "key1", "run_a_method_that_is_not_registered")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Method 'run_a_method_that_is_not_registered' not registered for model 'tasket.tests.TestModel'"
        );
    }

    #[tokio::test]
    async fn test_invalid_model_and_object() {
        let h = Harness::new();
        let err = h
            .app
            .manager
            .create_task("tasket.tests.NotAValidModel", "key1", "a_method")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::UnknownTargetType(t) if t == "tasket.tests.NotAValidModel"));

        let err = h
            .app
            .manager
            .create_task(TYPE, "key_that_does_not_exist", "run_something_long")
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ObjectNotFound { .. }));
        assert_eq!(err.to_string(), "Not a good object loaded");
    }

    #[tokio::test]
    async fn test_tasks_for_object() {
        let h = Harness::new();
        let tasks = h.app.manager.tasks_for_object(TYPE, "key2").await.unwrap();
        assert_eq!(tasks.len(), 10);
        assert_eq!(tasks[0].status, TaskStatus::Defined);
        assert_eq!(tasks[1].status, TaskStatus::Defined);
        assert_eq!(tasks[0].method, "run_something_long");
        assert_eq!(tasks[1].method, "run_something_else");
        assert_eq!(tasks[5].method, "run_something_fast");
        assert_eq!(tasks[0].description, "Run a successful task");
        assert_eq!(tasks[0].created_at, test_time());

        let again = h.app.manager.tasks_for_object(TYPE, "key2").await.unwrap();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        let again_ids: Vec<TaskId> = again.iter().map(|t| t.id).collect();
        assert_eq!(ids, again_ids);
    }

    #[tokio::test]
    async fn test_task_for_object() {
        let h = Harness::new();
        let err = h
            .app
            .manager
            .task_for_object(TYPE, "key2", "run_doesn_not_exists")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Method 'run_doesn_not_exists' not registered for model 'tasket.tests.TestModel'"
        );

        let task = h
            .app
            .manager
            .task_for_object(TYPE, "key2", "run_something_long")
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Defined);
        assert_eq!(task.method, "run_something_long");
    }

    #[tokio::test]
    async fn test_task_for_object_required() {
        let h = Harness::new();
        let task = h
            .app
            .manager
            .task_for_object(TYPE, "key-more", "run_something_with_two_required")
            .await
            .unwrap();
        let methods: Vec<String> = h
            .app
            .manager
            .required_tasks(task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.method)
            .collect();
        assert_eq!(methods, vec!["run_something_long", "run_something_with_required"]);
    }

    #[tokio::test]
    async fn test_required_tasks_are_reused() {
        let h = Harness::new();
        let with_required = h.create("key1", "run_something_with_required").await;
        let required = h.app.manager.required_tasks(with_required.id).await.unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].method, "run_something_long");

        let two_required = h.create("key1", "run_something_with_two_required").await;
        assert_eq!(
            two_required.required_task_ids,
            vec![required[0].id, with_required.id]
        );
    }

    #[tokio::test]
    async fn test_archive_on_create() {
        let h = Harness::new();
        let tasks = h.app.manager.tasks_for_object(TYPE, "key3").await.unwrap();
        let task = tasks[0].clone();
        assert!(!task.archived);

        let new_task = h.create("key3", "run_something_long").await;
        assert_ne!(task.id, new_task.id);
        assert_eq!(new_task.supersedes, Some(task.id));

        let old = h.app.manager.get_task(task.id).await.unwrap();
        assert!(old.archived, "task should have been archived once a new one was created");

        let current = h
            .app
            .manager
            .task_for_object(TYPE, "key3", "run_something_long")
            .await
            .unwrap();
        assert_eq!(current.id, new_task.id);
    }

    #[tokio::test]
    async fn test_run_scheduled_is_a_no_op() {
        let h = Harness::new();
        let task = h.create("key1", "run_something_fast").await;
        let first = h.app.manager.run_task(task.id).await.unwrap();
        let second = h.app.manager.run_task(task.id).await.unwrap();
        assert_eq!(first.id, task.id);
        assert_eq!(second.id, task.id);
        assert_eq!(second.status, TaskStatus::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_running_is_rejected() {
        let h = Harness::new();
        let task = h.create("key1", "run_something_long").await;
        h.app.manager.run_task(task.id).await.unwrap();
        h.pass().await;

        let err = h.app.manager.run_task(task.id).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition { from: TaskStatus::Running, action: "run", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_again_creates_new_record() {
        let h = Harness::new();
        let tasks = h.app.manager.tasks_for_object(TYPE, "key1").await.unwrap();
        let task = tasks[5].clone();
        assert_eq!(task.method, "run_something_fast");

        h.app.manager.run_task(task.id).await.unwrap();
        h.pass().await;
        h.wait_for(task.id, TaskStatus::Successful).await;
        h.logs.take();

        let again = h.app.manager.run_task(task.id).await.unwrap();
        assert_ne!(again.id, task.id);
        assert_eq!(again.status, TaskStatus::Scheduled);
        assert_eq!(again.supersedes, Some(task.id));
        assert!(h.app.manager.get_task(task.id).await.unwrap().archived);

        assert_eq!(
            h.pass().await,
            crate::testing::start_message(again.id)
        );
        h.wait_for(again.id, TaskStatus::Successful).await;
        assert_eq!(
            h.logs.take(),
            crate::testing::finish_message(again.id, TaskStatus::Successful)
        );

        let tasks = h.app.manager.tasks_for_object(TYPE, "key1").await.unwrap();
        assert_eq!(tasks[5].id, again.id);

        let err = h.app.manager.run_task(task.id).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { action: "run archived", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_replaces_failed_required_task() {
        let h = Harness::new();
        let task = h.create("key1", "run_something_with_required_failing").await;
        let failing = h.app.manager.required_tasks(task.id).await.unwrap()[0].clone();

        h.app.manager.run_task(task.id).await.unwrap();
        h.pass().await;
        h.wait_for(failing.id, TaskStatus::Unsuccessful).await;
        h.pass().await;
        assert_eq!(h.status(task.id).await, TaskStatus::Unsuccessful);

        let rerun = h.app.manager.run_task(task.id).await.unwrap();
        assert_ne!(rerun.id, task.id);
        let required = h.app.manager.required_tasks(rerun.id).await.unwrap();
        assert_eq!(required.len(), 1);
        assert_ne!(required[0].id, failing.id);
        assert_eq!(required[0].method, "run_something_failing");
        assert_eq!(required[0].status, TaskStatus::Scheduled);
        assert!(h.app.manager.get_task(failing.id).await.unwrap().archived);
    }

    #[tokio::test]
    async fn test_cancel_defined_and_terminal() {
        let h = Harness::new();
        let task = h.create("key1", "run_something_long").await;

        let cancelled = h.app.manager.cancel_task(task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.log, "");
        assert_eq!(cancelled.end_date, Some(test_time()));

        let err = h.app.manager.cancel_task(task.id).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidTransition { from: TaskStatus::Cancelled, action: "cancel", .. }
        ));
    }

    #[tokio::test]
    async fn test_complete_log_of_task_never_run() {
        let h = Harness::new();
        let task = h.create("key1", "run_something_with_required").await;
        assert_eq!(
            h.app.manager.complete_log(task.id).await.unwrap(),
            "Run a successful task started\nRun a task with a required task started"
        );
    }

    #[tokio::test]
    async fn test_unknown_task_id() {
        let h = Harness::new();
        let missing = TaskId::new(404);
        assert!(matches!(
            h.app.manager.get_task(missing).await,
            Err(TaskError::TaskNotFound(id)) if id == missing
        ));
        assert!(matches!(
            h.app.manager.run_task(missing).await,
            Err(TaskError::TaskNotFound(_))
        ));
        assert!(matches!(
            h.app.manager.cancel_task(missing).await,
            Err(TaskError::TaskNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_removes_record_and_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::with_config(SchedulerConfig {
            log_dir: Some(dir.path().to_path_buf()),
            ..SchedulerConfig::default()
        });
        let task = h.create("key1", "run_something_fast").await;
        h.app.manager.run_task(task.id).await.unwrap();
        h.pass().await;
        h.wait_for(task.id, TaskStatus::Successful).await;

        let path = dir.path().join(format!("task-{}.log", task.id));
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "running run_something_fast\n"
        );

        let deleted = h.app.manager.delete_task(task.id).await.unwrap();
        assert_eq!(deleted.id, task.id);
        assert!(!path.exists());
        assert!(matches!(
            h.app.manager.get_task(task.id).await,
            Err(TaskError::TaskNotFound(_))
        ));
        assert!(matches!(
            h.app.manager.delete_task(task.id).await,
            Err(TaskError::TaskNotFound(_))
        ));
    }
}

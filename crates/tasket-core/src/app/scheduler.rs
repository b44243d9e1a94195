//! Scheduler - スケジューリングパス
//!
//! # 1 パスの流れ
//! 1. キャンセル済み（または削除済み）の実行中ワーカーへ割り込み、終了済みワーカーを回収
//! 2. 前提タスクが失敗したタスクを scheduled → unsuccessful（連鎖がなくなるまで）
//! 3. 前提がすべて successful のタスクを scheduled → running にして起動
//!
//! パスは同時に 1 つだけ。実行中に要求されたパスは、実行中のパスの再実行にまとめる。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::Executor;
use crate::config::SchedulerConfig;
use crate::domain::{StatusUpdate, StoreError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{ArtifactStore, Clock, TaskStore};
use crate::typed::TaskRegistry;

struct ActiveWorker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    interrupted: bool,
}

type ActiveTable = HashMap<TaskId, ActiveWorker>;

/// Where a scheduled task stands with respect to its required tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Ready,
    Waiting,
    /// A required task failed, was cancelled, deleted, or superseded before it ran.
    Blocked { required: TaskId, reason: &'static str },
}

struct SchedulerInner {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    executor: Executor,
    config: SchedulerConfig,

    /// In-flight workers. Holding this lock is what makes a pass exclusive.
    active: Mutex<ActiveTable>,

    /// A pass was requested and has not started yet.
    pending: AtomicBool,

    wake: Arc<Notify>,
}

/// Scheduler はタスクの起動・失敗伝播・割り込みを行う
///
/// Clone しても同じ状態（実行中テーブル）を共有する。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
        config: SchedulerConfig,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let executor = Executor::new(registry, store.clone(), clock.clone(), artifacts, wake.clone());
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                clock,
                executor,
                config,
                active: Mutex::new(HashMap::new()),
                pending: AtomicBool::new(false),
                wake,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Ask the loop for a pass as soon as possible.
    pub fn notify(&self) {
        self.inner.wake.notify_one();
    }

    /// Number of workers the scheduler still tracks.
    pub async fn in_flight(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    /// Run one scheduling pass.
    ///
    /// If a pass is already running this returns immediately and the running
    /// pass goes around once more.
    pub async fn run_pass(&self) -> Result<(), StoreError> {
        self.inner.pending.store(true, Ordering::SeqCst);
        loop {
            let Ok(mut active) = self.inner.active.try_lock() else {
                debug!("scheduling pass already running, request coalesced");
                return Ok(());
            };
            if !self.inner.pending.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            let result = self.pass(&mut active).await;
            drop(active);
            result?;
            if !self.inner.pending.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    /// Run passes every `poll_interval` and whenever `notify` is called,
    /// until `shutdown` fires.
    pub fn spawn_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        let interval = self.inner.config.poll_interval();
        tokio::spawn(async move {
            info!(poll_interval_ms = interval.as_millis() as u64, "scheduler loop started");
            loop {
                if let Err(err) = scheduler.run_pass().await {
                    error!(error = %err, "scheduling pass failed");
                }
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                    () = scheduler.inner.wake.notified() => {}
                }
            }
            info!("scheduler loop stopped");
        })
    }

    async fn pass(&self, active: &mut ActiveTable) -> Result<(), StoreError> {
        self.interrupt_cancelled(active).await?;
        self.propagate_failures().await?;
        self.dispatch_ready(active).await
    }

    async fn interrupt_cancelled(&self, active: &mut ActiveTable) -> Result<(), StoreError> {
        let store = &self.inner.store;
        let mut ids: Vec<TaskId> = active.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some(worker) = active.get_mut(&id) else {
                continue;
            };
            if worker.interrupted {
                continue;
            }
            let cancelled = match store.get(id).await {
                Ok(record) => record.status == TaskStatus::Cancelled,
                // A finished worker whose record is gone is just reaped below.
                Err(StoreError::NotFound(_)) => !worker.handle.is_finished(),
                Err(err) => return Err(err),
            };
            if !cancelled {
                continue;
            }

            info!("Cancelling task {id}...");
            if worker.handle.is_finished() {
                warn!("Failed to interrupt task {id}: worker already finished");
            } else {
                worker.cancel.cancel();
            }
            worker.interrupted = true;
            info!("...Task {id} cancelled.");
        }

        active.retain(|_, worker| !worker.handle.is_finished());
        Ok(())
    }

    /// Move scheduled tasks whose required tasks can no longer succeed to
    /// `unsuccessful`, repeating until nothing changes so chains settle in one
    /// pass.
    async fn propagate_failures(&self) -> Result<(), StoreError> {
        let store = &self.inner.store;
        loop {
            let mut changed = false;
            for task in store.list_by_status(TaskStatus::Scheduled).await? {
                let Readiness::Blocked { required, reason } = self.readiness(&task).await? else {
                    continue;
                };
                let update = StatusUpdate::to(TaskStatus::Unsuccessful).ended_at(self.inner.clock.now());
                match store
                    .compare_and_set_status(task.id, TaskStatus::Scheduled, update)
                    .await
                {
                    Ok(true) => {
                        debug!(task = %task.id, required = %required, reason, "required task failed, task marked unsuccessful");
                        changed = true;
                    }
                    Ok(false) | Err(StoreError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    async fn dispatch_ready(&self, active: &mut ActiveTable) -> Result<(), StoreError> {
        for task in self.inner.store.list_by_status(TaskStatus::Scheduled).await? {
            if active.contains_key(&task.id) {
                continue;
            }
            if self.readiness(&task).await? != Readiness::Ready {
                continue;
            }
            if let Some(max) = self.inner.config.max_concurrent_tasks
                && active.len() >= max
            {
                debug!(task = %task.id, max, "concurrency cap reached, task waits");
                continue;
            }
            self.dispatch(task, active).await?;
        }
        Ok(())
    }

    async fn readiness(&self, task: &TaskRecord) -> Result<Readiness, StoreError> {
        let mut readiness = Readiness::Ready;
        for &required in &task.required_task_ids {
            let record = match self.inner.store.get(required).await {
                Ok(record) => record,
                Err(StoreError::NotFound(_)) => {
                    return Ok(Readiness::Blocked { required, reason: "deleted" });
                }
                Err(err) => return Err(err),
            };
            match record.status {
                TaskStatus::Successful => {}
                TaskStatus::Unsuccessful => {
                    return Ok(Readiness::Blocked { required, reason: "unsuccessful" });
                }
                TaskStatus::Cancelled => {
                    return Ok(Readiness::Blocked { required, reason: "cancelled" });
                }
                TaskStatus::Defined if record.archived => {
                    return Ok(Readiness::Blocked { required, reason: "superseded" });
                }
                TaskStatus::Defined | TaskStatus::Scheduled | TaskStatus::Running => {
                    readiness = Readiness::Waiting;
                }
            }
        }
        Ok(readiness)
    }

    async fn dispatch(&self, task: TaskRecord, active: &mut ActiveTable) -> Result<(), StoreError> {
        let id = task.id;
        let update = StatusUpdate::to(TaskStatus::Running).started_at(self.inner.clock.now());
        match self
            .inner
            .store
            .compare_and_set_status(id, TaskStatus::Scheduled, update)
            .await
        {
            Ok(true) => {}
            Ok(false) | Err(StoreError::NotFound(_)) => {
                warn!("Failed to change status from \"scheduled\" to \"running\" for task {id}");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        info!("Starting task {id}...");
        let cancel = CancellationToken::new();
        let handle = self.inner.executor.spawn(task, cancel.clone());
        active.insert(
            id,
            ActiveWorker {
                handle,
                cancel,
                interrupted: false,
            },
        );
        info!("...Task {id} started.");
        Ok(())
    }
}

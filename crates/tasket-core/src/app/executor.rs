//! Executor - 1 タスク分の実行
//!
//! # フロー
//! 1. レコードのメソッドをインスタンスに bind
//! 2. 出力チャネルとログポンプを起動
//! 3. メソッドを子 tokio task で実行（panic を閉じ込め、キャンセル時は abort）
//! 4. ポンプを drain してからトレースを追記
//! 5. running → successful / unsuccessful を compare-and-set

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{StatusUpdate, StoreError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{ArtifactStore, Clock, TaskStore};
use crate::typed::{TaskContext, TaskOutput, TaskRegistry};

#[derive(Clone)]
pub(crate) struct Executor {
    registry: Arc<TaskRegistry>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    /// Wakes the scheduler when a task ends, so dependents start promptly.
    wake: Arc<Notify>,
}

impl Executor {
    pub(crate) fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            artifacts,
            wake,
        }
    }

    /// Spawn the worker for `task`, which the caller has already moved to
    /// `running`.
    pub(crate) fn spawn(&self, task: TaskRecord, cancel: CancellationToken) -> JoinHandle<()> {
        let executor = self.clone();
        tokio::spawn(async move {
            let id = task.id;
            executor.run(task, cancel).await;
            executor.wake.notify_one();
            debug!(task = %id, "worker exited");
        })
    }

    async fn run(&self, task: TaskRecord, cancel: CancellationToken) {
        let id = task.id;

        let bound = match self.registry.bind(&task.target, &task.method) {
            Ok(bound) => bound,
            Err(err) => {
                self.finish(id, TaskStatus::Unsuccessful, Some(format!("Error: {err}\n")))
                    .await;
                return;
            }
        };

        let (output, rx) = TaskOutput::channel();
        let drained = CancellationToken::new();
        let pump = tokio::spawn(pump_log(
            self.store.clone(),
            self.artifacts.clone(),
            id,
            rx,
            drained.clone(),
        ));

        let ctx = TaskContext::new(id, output, cancel.clone());
        let mut child = tokio::spawn(bound.invoke(ctx));

        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                child.abort();
                let _ = (&mut child).await;
                None
            }
            joined = &mut child => Some(joined),
        };

        drained.cancel();
        if let Err(err) = pump.await {
            warn!(task = %id, error = %err, "log pump failed");
        }

        let Some(joined) = joined.filter(|_| !cancel.is_cancelled()) else {
            debug!(task = %id, "worker interrupted");
            return;
        };

        let (status, trace) = match joined {
            Ok(Ok(())) => (TaskStatus::Successful, None),
            Ok(Err(err)) => (TaskStatus::Unsuccessful, Some(format!("Error: {err:?}\n"))),
            Err(join_err) => (TaskStatus::Unsuccessful, Some(panic_trace(join_err))),
        };
        self.finish(id, status, trace).await;
    }

    /// Append the failure trace (while still running) and record the
    /// terminal status.
    async fn finish(&self, id: TaskId, status: TaskStatus, trace: Option<String>) {
        if let Some(trace) = trace {
            append(&self.store, self.artifacts.as_deref(), id, &trace).await;
        }

        let update = StatusUpdate::to(status).ended_at(self.clock.now());
        match self
            .store
            .compare_and_set_status(id, TaskStatus::Running, update)
            .await
        {
            Ok(true) => info!("Task {id} finished with status \"{status}\""),
            Ok(false) | Err(StoreError::NotFound(_)) => warn!(
                "failed to mark task as finished, from status \"running\" to \"{status}\" for task {id}. May have been finished in a different thread already."
            ),
            Err(err) => warn!(task = %id, error = %err, "failed to record task outcome"),
        }
    }
}

/// Forward output lines to the store until every sender is gone, or until
/// `drained` fires, at which point whatever is still buffered is flushed.
async fn pump_log(
    store: Arc<dyn TaskStore>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    id: TaskId,
    mut rx: UnboundedReceiver<String>,
    drained: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            text = rx.recv() => match text {
                Some(text) => append(&store, artifacts.as_deref(), id, &text).await,
                None => return,
            },
            () = drained.cancelled() => break,
        }
    }

    rx.close();
    while let Some(text) = rx.recv().await {
        append(&store, artifacts.as_deref(), id, &text).await;
    }
}

/// Conditional append: only lands while the task is still `running`.
async fn append(
    store: &Arc<dyn TaskStore>,
    artifacts: Option<&dyn ArtifactStore>,
    id: TaskId,
    text: &str,
) {
    match store.append_log(id, TaskStatus::Running, text).await {
        Ok(true) => {
            if let Some(artifacts) = artifacts
                && let Err(err) = artifacts.append(id, text).await
            {
                warn!(task = %id, error = %err, "failed to mirror task output");
            }
        }
        Ok(false) => debug!(task = %id, "task no longer running, output dropped"),
        Err(err) => warn!(task = %id, error = %err, "failed to append task output"),
    }
}

fn panic_trace(err: JoinError) -> String {
    if !err.is_panic() {
        return "Error: worker aborted\n".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());
    format!("Panic: {message}\n")
}

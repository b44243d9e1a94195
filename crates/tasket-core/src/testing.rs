//! Test support: a log-capturing tracing layer, the test target model and a
//! wired app on a fixed clock.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use chrono::{DateTime, TimeZone, Utc};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

use crate::app::{App, AppBuilder};
use crate::config::SchedulerConfig;
use crate::domain::{TaskId, TaskRecord, TaskStatus};
use crate::impls::InMemoryTaskStore;
use crate::ports::FixedClock;
use crate::typed::{RegistryBuilder, Target, TaskContext, TaskRegistry};

/// Collects `LEVEL: message` lines for INFO and above.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<String>>,
}

impl LogCapture {
    /// Capture events on the current thread until the guard is dropped.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = Registry::default().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Everything captured so far; the buffer is cleared.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut lines = self.lines.lock().unwrap();
        lines.push_str(&format!("{level}: {}\n", visitor.0));
    }
}

pub fn start_message(id: TaskId) -> String {
    format!("INFO: Starting task {id}...\nINFO: ...Task {id} started.\n")
}

pub fn finish_message(id: TaskId, status: TaskStatus) -> String {
    format!("INFO: Task {id} finished with status \"{status}\"\n")
}

/// Mock model; only a handful of keys load.
pub struct TestModel {
    pub key: String,
}

impl Target for TestModel {
    const TYPE: &'static str = "tasket.tests.TestModel";
}

pub const VALID_KEYS: [&str; 5] = ["key1", "key2", "key3", "key with space", "key-more"];

fn load_test_model(key: &str) -> anyhow::Result<TestModel> {
    if !VALID_KEYS.contains(&key) {
        bail!("Not a good object loaded");
    }
    Ok(TestModel {
        key: key.to_string(),
    })
}

async fn run(ctx: &TaskContext, trigger: &str, sleep_ms: u64) -> anyhow::Result<()> {
    ctx.println(format!("running {trigger}"));
    ctx.sleep(Duration::from_millis(sleep_ms)).await?;
    Ok(())
}

async fn run_something_long(_model: Arc<TestModel>, ctx: TaskContext) -> anyhow::Result<()> {
    run(&ctx, "run_something_long_1", 0).await?;
    ctx.sleep(Duration::from_millis(200)).await?;
    run(&ctx, "run_something_long_2", 200).await
}

async fn run_something_else(_model: Arc<TestModel>, _ctx: TaskContext) -> anyhow::Result<()> {
    Ok(())
}

async fn run_something_failing(_model: Arc<TestModel>, ctx: TaskContext) -> anyhow::Result<()> {
    run(&ctx, "run_something_failing", 200).await?;
    bail!("Failed !")
}

async fn run_something_with_required(
    _model: Arc<TestModel>,
    ctx: TaskContext,
) -> anyhow::Result<()> {
    run(&ctx, "run_something_with_required", 200).await
}

async fn run_something_with_two_required(
    _model: Arc<TestModel>,
    ctx: TaskContext,
) -> anyhow::Result<()> {
    run(&ctx, "run_something_with_two_required", 200).await
}

async fn run_something_fast(_model: Arc<TestModel>, ctx: TaskContext) -> anyhow::Result<()> {
    run(&ctx, "run_something_fast", 100).await
}

async fn run_something_with_required_with_two_required(
    _model: Arc<TestModel>,
    ctx: TaskContext,
) -> anyhow::Result<()> {
    run(&ctx, "run_something_with_required_with_two_required", 200).await
}

async fn run_something_panicking(_model: Arc<TestModel>, ctx: TaskContext) -> anyhow::Result<()> {
    run(&ctx, "run_something_panicking", 100).await?;
    panic!("Panicked !")
}

async fn run_something_written(model: Arc<TestModel>, ctx: TaskContext) -> anyhow::Result<()> {
    let mut out = ctx.writer();
    write!(out, "writing for ")?;
    writeln!(out, "{}", model.key)?;
    write!(out, "no newline")?;
    Ok(())
}

pub fn test_registry() -> Arc<TaskRegistry> {
    let registry = RegistryBuilder::new()
        .target::<TestModel, _>(load_test_model)
        .register::<TestModel, _>("run_something_long", "Run a successful task", &[], run_something_long)
        .register::<TestModel, _>("run_something_else", "Run an empty task", &[], run_something_else)
        .register::<TestModel, _>("run_something_failing", "Run a failing task", &[], run_something_failing)
        .register::<TestModel, _>(
            "run_something_with_required",
            "Run a task with a required task",
            &["run_something_long"],
            run_something_with_required,
        )
        .register::<TestModel, _>(
            "run_something_with_two_required",
            "Run a task with two required task",
            &["run_something_long", "run_something_with_required"],
            run_something_with_two_required,
        )
        .register::<TestModel, _>("run_something_fast", "Run a fast task", &[], run_something_fast)
        .register::<TestModel, _>(
            "run_something_with_required_failing",
            "Run a task with a required task that fails",
            &["run_something_failing"],
            run_something_with_required,
        )
        .register::<TestModel, _>(
            "run_something_with_required_with_two_required",
            "Run a task with a required task that has a required task",
            &["run_something_with_two_required"],
            run_something_with_required_with_two_required,
        )
        .register::<TestModel, _>("run_something_panicking", "Run a panicking task", &[], run_something_panicking)
        .register::<TestModel, _>("run_something_written", "Run a task writing through io::Write", &[], run_something_written)
        .build()
        .unwrap();
    Arc::new(registry)
}

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// App on a fixed clock with logs captured on the current thread.
pub struct Harness {
    pub app: App,
    pub store: InMemoryTaskStore,
    pub logs: LogCapture,
    _guard: DefaultGuard,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let (logs, guard) = LogCapture::install();
        let store = InMemoryTaskStore::new();
        let app = AppBuilder::new()
            .registry(test_registry())
            .store(Arc::new(store.clone()))
            .clock(Arc::new(FixedClock::new(test_time())))
            .config(config)
            .build()
            .unwrap();
        Self {
            app,
            store,
            logs,
            _guard: guard,
        }
    }

    pub async fn create(&self, key: &str, method: &str) -> TaskRecord {
        self.app
            .manager
            .create_task(TestModel::TYPE, key, method)
            .await
            .unwrap()
    }

    pub async fn status(&self, id: TaskId) -> TaskStatus {
        self.app.manager.get_task(id).await.unwrap().status
    }

    /// Run one pass and return what it logged.
    pub async fn pass(&self) -> String {
        self.app.scheduler.run_pass().await.unwrap();
        self.logs.take()
    }

    /// Poll (in paused time) until the task reaches `status`.
    pub async fn wait_for(&self, id: TaskId, status: TaskStatus) -> TaskRecord {
        for _ in 0..1000 {
            let record = self.app.manager.get_task(id).await.unwrap();
            if record.status == status {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never reached {status}");
    }

    /// Poll until the task log contains `needle`.
    pub async fn wait_for_log(&self, id: TaskId, needle: &str) {
        for _ in 0..1000 {
            let record = self.app.manager.get_task(id).await.unwrap();
            if record.log.contains(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never logged {needle:?}");
    }
}

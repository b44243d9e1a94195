//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - ports の差し替え（テストでは FixedClock / InMemoryTaskStore）

use std::sync::Arc;

use super::manager::TaskManager;
use super::scheduler::Scheduler;
use crate::config::SchedulerConfig;
use crate::impls::{InMemoryTaskStore, LocalArtifactStore};
use crate::ports::{ArtifactStore, Clock, SystemClock, TaskStore};
use crate::typed::{self, TaskRegistry};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .registry(Arc::new(registry))
///     .config(SchedulerConfig::load(path)?)
///     .expect_targets(&["acme.reports.Report"])
///     .build()?;
///
/// let loop_handle = app.scheduler.spawn_loop(shutdown.clone());
/// let task = app.manager.create_task("acme.reports.Report", "q3", "publish").await?;
/// app.manager.run_task(task.id).await?;
/// ```
///
/// # 既定値
/// - registry: 省略時は `typed::global()`（なければ BuildError）
/// - store: InMemoryTaskStore
/// - clock: SystemClock
/// - artifacts: 省略時、config.log_dir があれば LocalArtifactStore
#[derive(Default)]
pub struct AppBuilder {
    registry: Option<Arc<TaskRegistry>>,
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    config: SchedulerConfig,
    expected_targets: Option<Vec<String>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No task registry given and no global registry installed")]
    MissingRegistry,

    #[error("Missing target types: {0:?}. These types were expected but not registered.")]
    MissingTargetTypes(Vec<String>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// 期待される target_type のリストを設定
    pub fn expect_targets(mut self, target_types: &[&str]) -> Self {
        self.expected_targets = Some(target_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// 検証してワイヤリング
    ///
    /// # 検証
    /// - registry が決まること
    /// - expect_targets() の型がすべて registry にあること
    pub fn build(self) -> Result<App, BuildError> {
        let registry = self
            .registry
            .or_else(typed::global)
            .ok_or(BuildError::MissingRegistry)?;

        if let Some(expected) = &self.expected_targets {
            let registered = registry.target_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.iter().any(|r| *r == t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTargetTypes(missing));
            }
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let artifacts = self.artifacts.or_else(|| {
            self.config
                .log_dir
                .as_ref()
                .map(|dir| Arc::new(LocalArtifactStore::new(dir.clone())) as Arc<dyn ArtifactStore>)
        });

        let scheduler = Scheduler::new(
            registry.clone(),
            store.clone(),
            clock.clone(),
            artifacts.clone(),
            self.config,
        );
        let manager = TaskManager::new(registry.clone(), store, clock, artifacts, scheduler.clone());

        Ok(App {
            registry,
            manager,
            scheduler,
        })
    }
}

/// App はワイヤリング済みのランタイム
pub struct App {
    pub registry: Arc<TaskRegistry>,
    pub manager: TaskManager,
    pub scheduler: Scheduler,
}

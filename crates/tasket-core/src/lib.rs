//! tasket-core
//!
//! Registered object methods as named, resumable background tasks.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, target, status, record, duration, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, ArtifactStore, Clock）
//! - **typed**: 型付きの登録 API（Target, TaskMethod, TaskRegistry, TaskContext）
//! - **app**: アプリケーションロジック（builder, manager, scheduler）
//! - **impls**: 実装（InMemoryTaskStore, LocalArtifactStore）
//! - **config**: SchedulerConfig（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{App, AppBuilder, BuildError, Scheduler, TaskManager};
pub use config::{ConfigError, SchedulerConfig};
pub use domain::{TargetRef, TaskError, TaskId, TaskRecord, TaskStatus};
pub use typed::{RegistryBuilder, Target, TaskContext, TaskRegistry};

//! Ports - 抽象化レイヤー
//!
//! スケジューラとマネージャはこの trait だけに依存する。
//! 開発・テスト用の実装は `impls` にある。

pub mod artifact_store;
pub mod clock;
pub mod task_store;

pub use self::artifact_store::{ArtifactError, ArtifactStore};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::task_store::TaskStore;

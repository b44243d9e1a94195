//! App - アプリケーション層
//!
//! ports を組み合わせてタスクのライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **TaskManager**: 作成・実行要求・キャンセル・参照
//! - **Scheduler**: スケジューリングパスとループ
//! - **Executor**: 1 タスク分の実行（crate 内部）

pub mod builder;
pub mod manager;
pub mod scheduler;

mod executor;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::manager::TaskManager;
pub use self::scheduler::Scheduler;

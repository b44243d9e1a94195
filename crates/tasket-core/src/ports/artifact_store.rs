//! ArtifactStore port - タスクログのファイル出力先
//!
//! ストアの `log` が正本。ここはその写し（`task-<id>.log` など）で、
//! 書き込みに失敗してもタスクの状態には影響しない。

use async_trait::async_trait;

use crate::domain::TaskId;

/// ArtifactError はログ写しの I/O エラー
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
}

/// ArtifactStore はタスクごとのログ写しを保持
///
/// # 設計原則
/// - append は実行中の出力を行単位で追記
/// - remove はタスク削除時に呼ばれる（存在しなくてもエラーにしない）
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn append(&self, id: TaskId, text: &str) -> Result<(), ArtifactError>;

    async fn remove(&self, id: TaskId) -> Result<(), ArtifactError>;
}

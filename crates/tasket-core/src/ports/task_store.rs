//! TaskStore port - タスクレコードの正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - レコード（状態、日時、ログ、依存 id）
//! - アーカイブ（同じ (type, key, method) の旧レコード）
//!
//! 状態遷移はすべて compare-and-set で行う。複数の書き手（スケジューラ、
//! ワーカー、キャンセル要求）が競合した場合は、先に成功した方が勝つ。

use async_trait::async_trait;

use crate::domain::{NewTask, StatusUpdate, StoreError, TargetRef, TaskId, TaskRecord, TaskStatus};

/// TaskStore は状態・ログ・依存の正本
///
/// # 設計原則
/// - `create` は同じ triple の旧レコードのアーカイブと同一操作（原子的）
/// - `compare_and_set_status` は現在の状態が `expected` のときだけ更新
/// - `append_log` も状態が一致するときだけ追記（終了後の出力は捨てる）
/// - 一覧系は id 昇順（= 作成順）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new `defined` record and archive every earlier non-archived
    /// record of the same (target, method). `supersedes` points at the newest
    /// of those.
    async fn create(&self, new: NewTask) -> Result<TaskRecord, StoreError>;

    async fn get(&self, id: TaskId) -> Result<TaskRecord, StoreError>;

    /// All records of one target, archived included.
    async fn find_by_target(&self, target: &TargetRef) -> Result<Vec<TaskRecord>, StoreError>;

    /// The non-archived record of (target, method), if any.
    async fn find_current(
        &self,
        target: &TargetRef,
        method: &str,
    ) -> Result<Option<TaskRecord>, StoreError>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError>;

    /// Returns `Ok(false)` when the stored status is not `expected`.
    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        update: StatusUpdate,
    ) -> Result<bool, StoreError>;

    /// Returns `Ok(false)` (and appends nothing) when the status is not `expected`.
    async fn append_log(
        &self,
        id: TaskId,
        expected: TaskStatus,
        text: &str,
    ) -> Result<bool, StoreError>;

    async fn set_required(&self, id: TaskId, required: Vec<TaskId>) -> Result<(), StoreError>;

    async fn delete(&self, id: TaskId) -> Result<TaskRecord, StoreError>;
}

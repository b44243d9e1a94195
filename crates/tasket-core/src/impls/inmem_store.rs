//! InMemoryTaskStore - 開発・テスト用の正本
//!
//! # 実装詳細
//! - BTreeMap<TaskId, TaskRecord>（id 昇順 = 作成順で列挙できる）
//! - tokio::sync::Mutex で排他制御。全操作が 1 回のロック内で完結するので、
//!   create のアーカイブや compare-and-set は自然に原子的になる

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{NewTask, StatusUpdate, StoreError, TargetRef, TaskId, TaskRecord, TaskStatus};
use crate::ports::TaskStore;

struct StoreState {
    records: BTreeMap<TaskId, TaskRecord>,

    /// Next task ID to assign.
    next_id: TaskId,
}

impl StoreState {
    fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    fn get_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord, StoreError> {
        self.records.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

/// InMemoryTaskStore は開発用の TaskStore
///
/// Clone しても同じ状態を共有する。
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                records: BTreeMap::new(),
                next_id: TaskId::new(1),
            })),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, new: NewTask) -> Result<TaskRecord, StoreError> {
        let mut state = self.state.lock().await;

        let mut supersedes = None;
        for record in state.records.values_mut() {
            if !record.archived && record.matches(&new.target, &new.method) {
                record.archived = true;
                supersedes = Some(record.id);
            }
        }

        let id = state.allocate_id();
        let record = TaskRecord {
            id,
            target: new.target,
            method: new.method,
            status: TaskStatus::Defined,
            description: new.description,
            log: String::new(),
            start_date: None,
            end_date: None,
            archived: false,
            required_task_ids: Vec::new(),
            supersedes,
            created_at: new.created_at,
        };
        state.records.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let state = self.state.lock().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn find_by_target(&self, target: &TargetRef) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.target == *target)
            .cloned()
            .collect())
    }

    async fn find_current(
        &self,
        target: &TargetRef,
        method: &str,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .find(|r| !r.archived && r.matches(target, method))
            .cloned())
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        update: StatusUpdate,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.get_mut(id)?;
        if record.status != expected {
            return Ok(false);
        }
        update.apply(record);
        Ok(true)
    }

    async fn append_log(
        &self,
        id: TaskId,
        expected: TaskStatus,
        text: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.get_mut(id)?;
        if record.status != expected {
            return Ok(false);
        }
        record.log.push_str(text);
        Ok(true)
    }

    async fn set_required(&self, id: TaskId, required: Vec<TaskId>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.get_mut(id)?.required_task_ids = required;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.records.remove(&id).ok_or(StoreError::NotFound(id))
    }
}

//! TaskStore port - 隠し名前空間へのアクセス
//!
//! タスクは隠し account 配下の container（scope）に置かれたエントリ。
//! push 配送ではなく listing で見えるキューとして扱う。
//! lease も ack も無い。完了はエントリの delete のみ。

use async_trait::async_trait;

use crate::domain::{AccountName, Scope, StoreError, TaskCursor, TaskEntry, TaskId};

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Task containers under a hidden account.
    async fn list_scopes(&self, account: &AccountName) -> Result<Vec<Scope>, StoreError>;

    /// Up to `limit` entries of `scope` strictly after `after`, oldest first.
    async fn list_tasks(
        &self,
        scope: &Scope,
        after: Option<&TaskCursor>,
        limit: usize,
    ) -> Result<Vec<TaskEntry>, StoreError>;

    /// Deleting a missing entry is `Ok(DeleteStatus::NotFound)`, not an error.
    async fn delete_task(&self, scope: &Scope, task: &TaskId) -> Result<DeleteStatus, StoreError>;

    /// Write (or overwrite) an entry. Used by enqueue helpers.
    async fn put_task(&self, scope: &Scope, entry: TaskEntry) -> Result<(), StoreError>;
}

//! Enqueue helpers - 隠し名前空間へタスクを書き込む
//!
//! 通常のタスク書き込みはストア側（外部）の責務だが、運用ツールや
//! テストから同じ名前規則でエントリを作れるようにしておく。

use chrono::{DateTime, Utc};

use crate::domain::{ObjectPath, PolicyIndex, StoreError, Task};
use crate::ports::{Clock, TaskStore};

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("source and destination policy are both {0}")]
    SamePolicy(PolicyIndex),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Queue `target` for deletion at `delete_at`.
pub async fn enqueue_expiration(
    store: &dyn TaskStore,
    clock: &dyn Clock,
    target: ObjectPath,
    delete_at: DateTime<Utc>,
) -> Result<Task, EnqueueError> {
    let task = Task::expiration(target, delete_at, clock.now());
    store.put_task(&task.scope, task.entry()).await?;
    tracing::debug!(scope = %task.scope, task = %task.id, "queued expiration");
    Ok(task)
}

/// Queue `target` for a copy from `source` to `dest` policy.
pub async fn enqueue_reconcile(
    store: &dyn TaskStore,
    clock: &dyn Clock,
    target: ObjectPath,
    source: PolicyIndex,
    dest: PolicyIndex,
    timestamp: DateTime<Utc>,
) -> Result<Task, EnqueueError> {
    if source == dest {
        return Err(EnqueueError::SamePolicy(source));
    }
    let task = Task::reconcile(target, source, dest, timestamp, clock.now());
    store.put_task(&task.scope, task.entry()).await?;
    tracing::debug!(scope = %task.scope, task = %task.id, "queued reconciliation");
    Ok(task)
}

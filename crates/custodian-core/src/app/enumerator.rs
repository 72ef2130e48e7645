//! TaskEnumerator - 1 サイクル分のタスク列を作る
//!
//! - 自分の担当 scope（Partitioner）だけを列挙する
//! - scope ごとに `batch_size` 件ずつ、round-robin で取り出す
//!   （巨大な backlog を持つ scope が他を飢えさせない、メモリも上限付き）
//! - 各エントリを解読し、`now >= scheduled_at + delay` なら Due
//!
//! ストリームは遅延評価。途中で drop しても副作用は無く、
//! 作り直せば最初からストアを読み直す（lease は取らない）。

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

use super::delay::DelayPolicy;
use super::partition::Partitioner;
use crate::domain::{Scope, StoreError, Task, TaskCursor, TaskEntry, TaskNamespace, TaskParseError};
use crate::ports::{Clock, TaskStore};

/// One item of the cycle's listing.
#[derive(Debug, Clone)]
pub enum Listed {
    /// Ready to execute.
    Due(Task),

    /// Valid, but `scheduled_at + delay` is still in the future.
    NotDue { task: Task, due_at: DateTime<Utc> },

    /// Entry name could not be decoded.
    Malformed {
        scope: Scope,
        entry: TaskEntry,
        error: TaskParseError,
    },

    /// Listing failed; `scope` is `None` when the scope listing itself failed.
    /// The rest of that scope is skipped this cycle.
    ListingFailed {
        scope: Option<Scope>,
        error: StoreError,
    },
}

#[derive(Clone)]
pub struct TaskEnumerator {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    namespace: TaskNamespace,
    partitioner: Partitioner,
    delays: Arc<DelayPolicy>,
    batch_size: usize,
}

struct ScopeCursor {
    scope: Scope,
    after: Option<TaskCursor>,
}

struct EnumerationState {
    enumerator: TaskEnumerator,
    scopes: Option<VecDeque<ScopeCursor>>,
    buffer: VecDeque<Listed>,
}

impl TaskEnumerator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        namespace: TaskNamespace,
        partitioner: Partitioner,
        delays: Arc<DelayPolicy>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            clock,
            namespace,
            partitioner,
            delays,
            batch_size: batch_size.max(1),
        }
    }

    /// Lazy listing for one cycle.
    pub fn listing(&self) -> impl Stream<Item = Listed> + Send + 'static {
        let state = EnumerationState {
            enumerator: self.clone(),
            scopes: None,
            buffer: VecDeque::new(),
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((item, state));
                }
                if state.scopes.is_none() {
                    match state.enumerator.owned_scopes().await {
                        Ok(scopes) => state.scopes = Some(scopes),
                        Err(error) => {
                            state.scopes = Some(VecDeque::new());
                            let item = Listed::ListingFailed { scope: None, error };
                            return Some((item, state));
                        }
                    }
                }
                let cursor = state.scopes.as_mut()?.pop_front()?;
                let next = state.enumerator.next_batch(cursor, &mut state.buffer).await;
                if let Some(cursor) = next {
                    // 次のラウンドで続きを読む
                    if let Some(scopes) = state.scopes.as_mut() {
                        scopes.push_back(cursor);
                    }
                }
            }
        })
    }

    /// Only the due tasks of [`listing`](Self::listing).
    pub fn due_tasks(&self) -> impl Stream<Item = Task> + Send + 'static {
        use futures::StreamExt;
        self.listing().filter_map(|item| async move {
            match item {
                Listed::Due(task) => Some(task),
                _ => None,
            }
        })
    }

    async fn owned_scopes(&self) -> Result<VecDeque<ScopeCursor>, StoreError> {
        let all = self.store.list_scopes(&self.namespace.account()).await?;
        let total = all.len();
        let owned: VecDeque<_> = all
            .into_iter()
            .filter(|scope| self.partitioner.owns(scope))
            .map(|scope| ScopeCursor { scope, after: None })
            .collect();
        tracing::debug!(
            namespace = self.namespace.account_str(),
            total,
            owned = owned.len(),
            process = self.partitioner.process(),
            processes = self.partitioner.processes(),
            "listed task scopes"
        );
        Ok(owned)
    }

    /// Fetch one batch of `cursor.scope` into `out`. Returns the cursor to
    /// continue from when the scope may have more entries.
    async fn next_batch(&self, cursor: ScopeCursor, out: &mut VecDeque<Listed>) -> Option<ScopeCursor> {
        let ScopeCursor { scope, after } = cursor;
        let entries = match self
            .store
            .list_tasks(&scope, after.as_ref(), self.batch_size)
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                out.push_back(Listed::ListingFailed {
                    scope: Some(scope),
                    error,
                });
                return None;
            }
        };

        let now = self.clock.now();
        let full = entries.len() >= self.batch_size;
        let last = entries.last().map(TaskEntry::cursor);
        for entry in entries {
            out.push_back(self.classify(&scope, entry, now));
        }

        match (full, last) {
            (true, Some(after)) => Some(ScopeCursor {
                scope,
                after: Some(after),
            }),
            _ => None,
        }
    }

    fn classify(&self, scope: &Scope, entry: TaskEntry, now: DateTime<Utc>) -> Listed {
        match Task::from_entry(scope, &entry) {
            Ok(task) => {
                let delay = self.delays.resolve_target(&task.target);
                match task.scheduled_at.checked_add_signed(delay) {
                    Some(due_at) if now >= due_at => Listed::Due(task),
                    Some(due_at) => Listed::NotDue { task, due_at },
                    // 表現できない期限は来ない
                    None => Listed::NotDue {
                        task,
                        due_at: DateTime::<Utc>::MAX_UTC,
                    },
                }
            }
            Err(error) => Listed::Malformed {
                scope: scope.clone(),
                entry,
                error,
            },
        }
    }
}

//! InMemoryTaskStore - 開発・テスト用の隠し名前空間
//!
//! # 実装詳細
//! - account → container → (TaskCursor 順の BTreeMap) で保持
//! - TaskId → TaskCursor の索引で delete を O(log n) にする
//! - fault injection: `fail_next` で次の n リクエストを Unavailable にする

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{AccountName, ContainerName, Scope, StoreError, TaskCursor, TaskEntry, TaskId};
use crate::ports::{DeleteStatus, TaskStore};

#[derive(Default)]
struct ScopeEntries {
    by_cursor: BTreeMap<TaskCursor, TaskEntry>,
    index: HashMap<TaskId, TaskCursor>,
}

#[derive(Default)]
struct InMemoryTaskStoreState {
    accounts: BTreeMap<AccountName, BTreeMap<ContainerName, ScopeEntries>>,
    fail_next: u32,
    deletes: u64,
}

impl InMemoryTaskStoreState {
    fn check_available(&mut self) -> Result<(), StoreError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn scope(&self, scope: &Scope) -> Option<&ScopeEntries> {
        self.accounts.get(&scope.account)?.get(&scope.container)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<InMemoryTaskStoreState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` requests fail with `StoreError::Unavailable`.
    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.fail_next = n;
    }

    /// All entries of `scope`, oldest first.
    pub async fn entries(&self, scope: &Scope) -> Vec<TaskEntry> {
        let state = self.state.lock().await;
        state
            .scope(scope)
            .map(|s| s.by_cursor.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of entries across all hidden accounts.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state
            .accounts
            .values()
            .flat_map(|containers| containers.values())
            .map(|s| s.by_cursor.len())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of entries actually removed so far.
    pub async fn deletes(&self) -> u64 {
        self.state.lock().await.deletes
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list_scopes(&self, account: &AccountName) -> Result<Vec<Scope>, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let scopes = state
            .accounts
            .get(account)
            .map(|containers| {
                containers
                    .keys()
                    .map(|c| Scope::new(account.clone(), c.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(scopes)
    }

    async fn list_tasks(
        &self,
        scope: &Scope,
        after: Option<&TaskCursor>,
        limit: usize,
    ) -> Result<Vec<TaskEntry>, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let Some(entries) = state.scope(scope) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Unbounded,
        };
        Ok(entries
            .by_cursor
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn delete_task(&self, scope: &Scope, task: &TaskId) -> Result<DeleteStatus, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let Some(containers) = state.accounts.get_mut(&scope.account) else {
            return Ok(DeleteStatus::NotFound);
        };
        let Some(entries) = containers.get_mut(&scope.container) else {
            return Ok(DeleteStatus::NotFound);
        };
        let Some(cursor) = entries.index.remove(task) else {
            return Ok(DeleteStatus::NotFound);
        };
        entries.by_cursor.remove(&cursor);
        if entries.by_cursor.is_empty() {
            containers.remove(&scope.container);
        }
        state.deletes += 1;
        Ok(DeleteStatus::Deleted)
    }

    async fn put_task(&self, scope: &Scope, entry: TaskEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let entries = state
            .accounts
            .entry(scope.account.clone())
            .or_default()
            .entry(scope.container.clone())
            .or_default();
        let cursor = entry.cursor();
        if let Some(old) = entries.index.insert(entry.id.clone(), cursor.clone()) {
            entries.by_cursor.remove(&old);
        }
        entries.by_cursor.insert(cursor, entry);
        Ok(())
    }
}

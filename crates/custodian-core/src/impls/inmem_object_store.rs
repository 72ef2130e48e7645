//! InMemoryObjectStore - 開発・テスト用のオブジェクトストア
//!
//! policy ごとに別のコピーを持つ。delete は全 policy のコピーを消す。
//! fault injection:
//! - `fail_next(n)`: 次の n リクエストを Unavailable に
//! - `make_unavailable(path)`: そのパスへのリクエストを常に Unavailable に

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{ObjectError, ObjectPath, PolicyIndex};
use crate::ports::{ObjectStore, StoredObject};

#[derive(Default)]
struct InMemoryObjectStoreState {
    objects: HashMap<ObjectPath, BTreeMap<PolicyIndex, StoredObject>>,
    unavailable: HashSet<ObjectPath>,
    fail_next: u32,
    requests: u64,
}

impl InMemoryObjectStoreState {
    fn begin(&mut self, path: &ObjectPath) -> Result<(), ObjectError> {
        self.requests += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(ObjectError::Unavailable("injected failure".to_string()));
        }
        if self.unavailable.contains(path) {
            return Err(ObjectError::Unavailable(format!("{path} is unreachable")));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    state: Arc<Mutex<InMemoryObjectStoreState>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.fail_next = n;
    }

    pub async fn make_unavailable(&self, path: &ObjectPath) {
        self.state.lock().await.unavailable.insert(path.clone());
    }

    pub async fn make_available(&self, path: &ObjectPath) {
        self.state.lock().await.unavailable.remove(path);
    }

    /// Direct read that bypasses fault injection.
    pub async fn peek(&self, path: &ObjectPath, policy: PolicyIndex) -> Option<StoredObject> {
        let state = self.state.lock().await;
        state.objects.get(path)?.get(&policy).cloned()
    }

    /// Policies currently holding a copy of `path`.
    pub async fn policies(&self, path: &ObjectPath) -> Vec<PolicyIndex> {
        let state = self.state.lock().await;
        state
            .objects
            .get(path)
            .map(|copies| copies.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Requests served so far, failed ones included.
    pub async fn requests(&self) -> u64 {
        self.state.lock().await.requests
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, path: &ObjectPath, policy: PolicyIndex) -> Result<StoredObject, ObjectError> {
        let mut state = self.state.lock().await;
        state.begin(path)?;
        state
            .objects
            .get(path)
            .and_then(|copies| copies.get(&policy))
            .cloned()
            .ok_or(ObjectError::NotFound)
    }

    async fn put(
        &self,
        path: &ObjectPath,
        policy: PolicyIndex,
        object: StoredObject,
    ) -> Result<(), ObjectError> {
        let mut state = self.state.lock().await;
        state.begin(path)?;
        state
            .objects
            .entry(path.clone())
            .or_default()
            .insert(policy, object);
        Ok(())
    }

    async fn delete(
        &self,
        path: &ObjectPath,
        if_delete_at: Option<DateTime<Utc>>,
    ) -> Result<(), ObjectError> {
        let mut state = self.state.lock().await;
        state.begin(path)?;
        let Some(copies) = state.objects.get(path) else {
            return Err(ObjectError::NotFound);
        };
        if let Some(expected) = if_delete_at {
            let matches = copies
                .values()
                .all(|object| object.delete_at() == Some(expected.timestamp()));
            if !matches {
                return Err(ObjectError::PreconditionFailed);
            }
        }
        state.objects.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DELETE_AT_META;

    fn path() -> ObjectPath {
        ObjectPath::parse("/AUTH_test/c/o").unwrap()
    }

    #[tokio::test]
    async fn copies_are_per_policy() {
        let store = InMemoryObjectStore::new();
        store
            .put(&path(), PolicyIndex(0), StoredObject::new("zero"))
            .await
            .unwrap();

        assert!(store.get(&path(), PolicyIndex(0)).await.is_ok());
        assert_eq!(
            store.get(&path(), PolicyIndex(1)).await,
            Err(ObjectError::NotFound)
        );
    }

    #[tokio::test]
    async fn conditional_delete_checks_expiry() {
        let store = InMemoryObjectStore::new();
        let object = StoredObject::new("x").with_meta(DELETE_AT_META, "1000");
        store.put(&path(), PolicyIndex(0), object).await.unwrap();

        let wrong = DateTime::from_timestamp(999, 0);
        assert_eq!(
            store.delete(&path(), wrong).await,
            Err(ObjectError::PreconditionFailed)
        );
        let right = DateTime::from_timestamp(1000, 0);
        assert_eq!(store.delete(&path(), right).await, Ok(()));
        assert_eq!(store.delete(&path(), right).await, Err(ObjectError::NotFound));
    }

    #[tokio::test]
    async fn unavailable_paths_fail_until_restored() {
        let store = InMemoryObjectStore::new();
        store.make_unavailable(&path()).await;
        assert!(matches!(
            store.get(&path(), PolicyIndex(0)).await,
            Err(ObjectError::Unavailable(_))
        ));
        store.make_available(&path()).await;
        assert_eq!(
            store.get(&path(), PolicyIndex(0)).await,
            Err(ObjectError::NotFound)
        );
        assert_eq!(store.requests().await, 2);
    }
}

//! Fixture - in-memory ストアの初期データ（JSON）
//!
//! ```json
//! {
//!   "now": 1700000000,
//!   "objects": [
//!     { "path": "/AUTH_a/c/o", "policy": 0, "body": "hello",
//!       "metadata": { "x-delete-at": "1700000000" } }
//!   ],
//!   "tasks": [
//!     { "kind": "expire", "path": "/AUTH_a/c/o", "delete_at": 1700000000 },
//!     { "kind": "reconcile", "path": "/AUTH_a/c/p", "source_policy": 0,
//!       "dest_policy": 1, "timestamp": 1700000000 },
//!     { "kind": "raw", "account": ".expiring_objects", "container": "1699920000",
//!       "name": "not-a-task", "created_at": 1600000000 }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use custodian_core::domain::{
    AccountName, ContainerName, ObjectPath, PolicyIndex, Scope, Task, TaskEntry, TaskId,
};
use custodian_core::impls::{InMemoryObjectStore, InMemoryTaskStore};
use custodian_core::ports::{ObjectStore, StoredObject, TaskStore};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Fixed clock (epoch seconds). Wall clock when absent.
    pub now: Option<i64>,
    pub objects: Vec<FixtureObject>,
    pub tasks: Vec<FixtureTask>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureObject {
    pub path: String,
    #[serde(default)]
    pub policy: u32,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureTask {
    Expire {
        path: String,
        delete_at: i64,
        created_at: Option<i64>,
    },
    Reconcile {
        path: String,
        source_policy: u32,
        dest_policy: u32,
        timestamp: i64,
        created_at: Option<i64>,
    },
    /// Entry written as-is, decodable or not.
    Raw {
        account: String,
        container: String,
        name: String,
        created_at: i64,
    },
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parse fixture {}", path.display()))
    }

    pub async fn seed(
        &self,
        tasks: &InMemoryTaskStore,
        objects: &InMemoryObjectStore,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for object in &self.objects {
            let path = ObjectPath::parse(&object.path)?;
            let mut stored = StoredObject::new(object.body.clone().into_bytes());
            stored.metadata = object.metadata.clone();
            objects
                .put(&path, PolicyIndex(object.policy), stored)
                .await
                .with_context(|| format!("seed object {path}"))?;
        }

        for task in &self.tasks {
            let (scope, entry) = match task {
                FixtureTask::Expire {
                    path,
                    delete_at,
                    created_at,
                } => {
                    let created = created_at.map(epoch).transpose()?.unwrap_or(now);
                    let task = Task::expiration(ObjectPath::parse(path)?, epoch(*delete_at)?, created);
                    (task.scope.clone(), task.entry())
                }
                FixtureTask::Reconcile {
                    path,
                    source_policy,
                    dest_policy,
                    timestamp,
                    created_at,
                } => {
                    let created = created_at.map(epoch).transpose()?.unwrap_or(now);
                    let task = Task::reconcile(
                        ObjectPath::parse(path)?,
                        PolicyIndex(*source_policy),
                        PolicyIndex(*dest_policy),
                        epoch(*timestamp)?,
                        created,
                    );
                    (task.scope.clone(), task.entry())
                }
                FixtureTask::Raw {
                    account,
                    container,
                    name,
                    created_at,
                } => {
                    let scope = Scope::new(AccountName::new(account)?, ContainerName::new(container)?);
                    let entry = TaskEntry {
                        id: TaskId::new(name)?,
                        created_at: epoch(*created_at)?,
                    };
                    (scope, entry)
                }
            };
            tasks
                .put_task(&scope, entry)
                .await
                .with_context(|| format!("seed task in {scope}"))?;
        }
        Ok(())
    }
}

pub fn epoch(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("timestamp out of range: {secs}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "now": 1700000000,
        "objects": [
            { "path": "/AUTH_a/c/o", "body": "hello", "metadata": { "x-delete-at": "1699999000" } }
        ],
        "tasks": [
            { "kind": "expire", "path": "/AUTH_a/c/o", "delete_at": 1699999000 },
            { "kind": "reconcile", "path": "/AUTH_a/c/p", "source_policy": 0, "dest_policy": 1, "timestamp": 1699990000 },
            { "kind": "raw", "account": ".expiring_objects", "container": "1699920000", "name": "junk", "created_at": 1600000000 }
        ]
    }"#;

    #[tokio::test]
    async fn seeds_objects_and_tasks() {
        let fixture: Fixture = serde_json::from_str(SAMPLE).unwrap();
        let tasks = InMemoryTaskStore::new();
        let objects = InMemoryObjectStore::new();

        fixture
            .seed(&tasks, &objects, epoch(1_700_000_000).unwrap())
            .await
            .unwrap();

        assert_eq!(tasks.len().await, 3);
        let path = ObjectPath::parse("/AUTH_a/c/o").unwrap();
        let stored = objects.peek(&path, PolicyIndex(0)).await.unwrap();
        assert_eq!(stored.delete_at(), Some(1_699_999_000));
    }

    #[test]
    fn unknown_task_kind_is_rejected() {
        let raw = r#"{ "tasks": [ { "kind": "shred", "path": "/a/c/o" } ] }"#;
        assert!(serde_json::from_str::<Fixture>(raw).is_err());
    }
}

//! ObjectStore port - 分散オブジェクトストア（ブラックボックス）
//!
//! 配置・レプリケーション・リングは外部の責務。
//! ここでは get / put / delete の契約だけを定義する。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::{ObjectError, ObjectPath, PolicyIndex};

/// Metadata key holding the object's scheduled expiry (epoch seconds).
pub const DELETE_AT_META: &str = "x-delete-at";

/// Object data plus user/system metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: BTreeMap<String, String>,
}

impl StoredObject {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn delete_at(&self) -> Option<i64> {
        self.metadata.get(DELETE_AT_META)?.parse().ok()
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, path: &ObjectPath, policy: PolicyIndex) -> Result<StoredObject, ObjectError>;

    async fn put(
        &self,
        path: &ObjectPath,
        policy: PolicyIndex,
        object: StoredObject,
    ) -> Result<(), ObjectError>;

    /// Delete every copy of `path`. With `if_delete_at`, the store answers
    /// `PreconditionFailed` unless the object's current expiry equals it.
    async fn delete(
        &self,
        path: &ObjectPath,
        if_delete_at: Option<DateTime<Utc>>,
    ) -> Result<(), ObjectError>;
}

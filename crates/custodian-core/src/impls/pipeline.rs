//! Pipeline - オブジェクトストア前段のミドルウェア列
//!
//! 各ステージは分類（MiddlewareClass）を持つ。
//! policy 間のデータ移動では bytes と metadata をそのまま運ぶ必要があるので、
//! reconciler は `Pipeline::restricted()` で pure なステージだけを残す。
//!
//! | class          | pure | 例                  |
//! |----------------|------|---------------------|
//! | Caching        | yes  | cache               |
//! | Logging        | yes  | proxy_logging       |
//! | ErrorCatching  | yes  | catch_errors        |
//! | Transformative | no   | encryption          |
//! | Redirective    | no   | symlink             |
//! | Composing      | no   | large-object assembly |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::domain::{ObjectError, ObjectPath, PolicyIndex};
use crate::ports::{ObjectStore, StoredObject};

/// Metadata key naming the object a symlink points at (`a/c/o`).
pub const SYMLINK_TARGET_META: &str = "x-symlink-target";

/// Maximum number of redirects followed for one `get`.
pub const MAX_REDIRECTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewareClass {
    Caching,
    Logging,
    ErrorCatching,
    Transformative,
    Redirective,
    Composing,
}

impl MiddlewareClass {
    /// Pure stages never change bytes, metadata or the target of a request.
    pub fn is_pure(self) -> bool {
        matches!(
            self,
            MiddlewareClass::Caching | MiddlewareClass::Logging | MiddlewareClass::ErrorCatching
        )
    }
}

/// One stage of the request path. Default hooks are pass-through.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn class(&self) -> MiddlewareClass;

    /// Where a `get` of `path` that returned `found` should go instead.
    fn redirect(&self, _path: &ObjectPath, _found: &StoredObject) -> Option<ObjectPath> {
        None
    }

    /// Rewrite a successful `get` response.
    fn filter_response(&self, _path: &ObjectPath, object: StoredObject) -> StoredObject {
        object
    }

    /// Called after every request with its result.
    fn observe(&self, _method: &str, _path: &ObjectPath, _result: Result<(), &ObjectError>) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown middleware {0:?} in pipeline")]
    UnknownMiddleware(String),
}

struct CatchErrors;

impl Middleware for CatchErrors {
    fn name(&self) -> &str {
        "catch_errors"
    }

    fn class(&self) -> MiddlewareClass {
        MiddlewareClass::ErrorCatching
    }

    fn observe(&self, method: &str, path: &ObjectPath, result: Result<(), &ObjectError>) {
        if let Err(err) = result
            && err.is_transient()
        {
            tracing::debug!(%method, %path, error = %err, "backend request failed");
        }
    }
}

struct ProxyLogging;

impl Middleware for ProxyLogging {
    fn name(&self) -> &str {
        "proxy_logging"
    }

    fn class(&self) -> MiddlewareClass {
        MiddlewareClass::Logging
    }

    fn observe(&self, method: &str, path: &ObjectPath, result: Result<(), &ObjectError>) {
        let status = match result {
            Ok(()) => "ok".to_string(),
            Err(err) => err.to_string(),
        };
        tracing::trace!(%method, %path, %status, "internal request");
    }
}

/// Placeholder for a response cache; the in-process store has nothing to cache.
struct Cache;

impl Middleware for Cache {
    fn name(&self) -> &str {
        "cache"
    }

    fn class(&self) -> MiddlewareClass {
        MiddlewareClass::Caching
    }
}

/// Follows `x-symlink-target` on reads.
struct Symlink;

impl Middleware for Symlink {
    fn name(&self) -> &str {
        "symlink"
    }

    fn class(&self) -> MiddlewareClass {
        MiddlewareClass::Redirective
    }

    fn redirect(&self, _path: &ObjectPath, found: &StoredObject) -> Option<ObjectPath> {
        let target = found.metadata.get(SYMLINK_TARGET_META)?;
        ObjectPath::parse(target).ok()
    }
}

/// Resolve a built-in stage by name.
pub fn builtin(name: &str) -> Result<Arc<dyn Middleware>, PipelineError> {
    let stage: Arc<dyn Middleware> = match name {
        "catch_errors" => Arc::new(CatchErrors),
        "proxy_logging" | "proxy-logging" => Arc::new(ProxyLogging),
        "cache" => Arc::new(Cache),
        "symlink" => Arc::new(Symlink),
        other => return Err(PipelineError::UnknownMiddleware(other.to_string())),
    };
    Ok(stage)
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub const DEFAULT: &'static str = "catch_errors proxy_logging cache";

    pub fn new(stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { stages }
    }

    /// Parse a whitespace separated list of built-in stage names.
    pub fn from_names(names: &str) -> Result<Self, PipelineError> {
        let stages = names
            .split_whitespace()
            .map(builtin)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    pub fn with_stage(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_pure(&self) -> bool {
        self.stages.iter().all(|s| s.class().is_pure())
    }

    /// Copy of this pipeline with every impure stage removed.
    pub fn restricted(&self) -> Self {
        let stages = self
            .stages
            .iter()
            .filter(|stage| {
                let keep = stage.class().is_pure();
                if !keep {
                    tracing::info!(
                        middleware = stage.name(),
                        class = ?stage.class(),
                        "dropping middleware from restricted pipeline"
                    );
                }
                keep
            })
            .cloned()
            .collect();
        Self { stages }
    }

    fn observe(&self, method: &str, path: &ObjectPath, result: Result<(), &ObjectError>) {
        for stage in &self.stages {
            stage.observe(method, path, result);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// An `ObjectStore` seen through a pipeline.
pub struct PipelinedStore {
    inner: Arc<dyn ObjectStore>,
    pipeline: Pipeline,
}

impl PipelinedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, pipeline: Pipeline) -> Self {
        Self { inner, pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[async_trait]
impl ObjectStore for PipelinedStore {
    async fn get(&self, path: &ObjectPath, policy: PolicyIndex) -> Result<StoredObject, ObjectError> {
        let mut current = path.clone();
        let mut hops = 0;
        let object = loop {
            let result = self.inner.get(&current, policy).await;
            self.pipeline
                .observe("GET", &current, result.as_ref().map(|_| ()));
            let object = result?;

            let next = self
                .pipeline
                .stages
                .iter()
                .find_map(|stage| stage.redirect(&current, &object));
            match next {
                Some(next) if hops < MAX_REDIRECTS => {
                    hops += 1;
                    current = next;
                }
                _ => break object,
            }
        };

        // 内側のステージから順に応答を書き換える
        Ok(self
            .pipeline
            .stages
            .iter()
            .rev()
            .fold(object, |object, stage| stage.filter_response(&current, object)))
    }

    async fn put(
        &self,
        path: &ObjectPath,
        policy: PolicyIndex,
        object: StoredObject,
    ) -> Result<(), ObjectError> {
        let result = self.inner.put(path, policy, object).await;
        self.pipeline.observe("PUT", path, result.as_ref().copied());
        result
    }

    async fn delete(
        &self,
        path: &ObjectPath,
        if_delete_at: Option<DateTime<Utc>>,
    ) -> Result<(), ObjectError> {
        let result = self.inner.delete(path, if_delete_at).await;
        self.pipeline.observe("DELETE", path, result.as_ref().copied());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryObjectStore;

    /// Flips every byte; stands in for an encryption layer.
    struct Scramble;

    impl Middleware for Scramble {
        fn name(&self) -> &str {
            "scramble"
        }

        fn class(&self) -> MiddlewareClass {
            MiddlewareClass::Transformative
        }

        fn filter_response(&self, _path: &ObjectPath, mut object: StoredObject) -> StoredObject {
            object.body = object.body.iter().map(|b| !b).collect::<Vec<u8>>().into();
            object
        }
    }

    fn p(s: &str) -> ObjectPath {
        ObjectPath::parse(s).unwrap()
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            Pipeline::from_names("catch_errors slo").unwrap_err(),
            PipelineError::UnknownMiddleware("slo".into())
        );
    }

    #[test]
    fn restricted_keeps_only_pure_stages_in_order() {
        let pipeline = Pipeline::from_names("catch_errors symlink proxy_logging cache")
            .unwrap()
            .with_stage(Arc::new(Scramble));
        assert!(!pipeline.is_pure());

        let restricted = pipeline.restricted();
        assert!(restricted.is_pure());
        assert_eq!(restricted.names(), ["catch_errors", "proxy_logging", "cache"]);
    }

    #[tokio::test]
    async fn symlink_stage_redirects_reads() {
        let inner = InMemoryObjectStore::new();
        inner
            .put(&p("/a/c/target"), PolicyIndex(0), StoredObject::new("real"))
            .await
            .unwrap();
        let link = StoredObject::new("").with_meta(SYMLINK_TARGET_META, "a/c/target");
        inner.put(&p("/a/c/link"), PolicyIndex(0), link).await.unwrap();

        let full = PipelinedStore::new(Arc::new(inner.clone()), Pipeline::from_names("symlink").unwrap());
        let got = full.get(&p("/a/c/link"), PolicyIndex(0)).await.unwrap();
        assert_eq!(got.body.as_ref(), b"real");

        let pure = PipelinedStore::new(Arc::new(inner), full.pipeline().restricted());
        let got = pure.get(&p("/a/c/link"), PolicyIndex(0)).await.unwrap();
        assert!(got.body.is_empty());
        assert_eq!(got.metadata[SYMLINK_TARGET_META], "a/c/target");
    }

    #[tokio::test]
    async fn symlink_loops_stop_after_max_redirects() {
        let inner = InMemoryObjectStore::new();
        let to_b = StoredObject::new("A").with_meta(SYMLINK_TARGET_META, "a/c/b");
        let to_a = StoredObject::new("B").with_meta(SYMLINK_TARGET_META, "a/c/a");
        inner.put(&p("/a/c/a"), PolicyIndex(0), to_b).await.unwrap();
        inner.put(&p("/a/c/b"), PolicyIndex(0), to_a).await.unwrap();

        let store = PipelinedStore::new(Arc::new(inner.clone()), Pipeline::from_names("symlink").unwrap());
        store.get(&p("/a/c/a"), PolicyIndex(0)).await.unwrap();
        // put 2 回 + get 初回 + MAX_REDIRECTS 回
        assert_eq!(inner.requests().await, 2 + 1 + MAX_REDIRECTS as u64);
    }

    #[tokio::test]
    async fn transformative_stage_rewrites_get_responses() {
        let inner = InMemoryObjectStore::new();
        inner
            .put(&p("/a/c/o"), PolicyIndex(0), StoredObject::new(vec![0u8, 1]))
            .await
            .unwrap();
        let store = PipelinedStore::new(Arc::new(inner), Pipeline::default().with_stage(Arc::new(Scramble)));

        let got = store.get(&p("/a/c/o"), PolicyIndex(0)).await.unwrap();
        assert_eq!(got.body.as_ref(), &[0xff, 0xfe]);
    }
}

//! TaskExecutor - 1 タスク分の副作用を実行する
//!
//! 想定内の失敗は `Outcome` として返し、エラーを投げない。
//!
//! - expire-delete: `if_delete_at = scheduled_at` 付きで delete。
//!   NotFound（既に無い）と PreconditionFailed（expiry が書き換わった）は成功扱い
//! - policy-reconcile: source policy から get し、dest policy へ put。
//!   get / put は pure なミドルウェアだけの経路を通す。source は消さない
//!
//! 一時的なエラーは 1 回の実行の中で `request_tries` 回まで繰り返す。

use std::future::Future;
use std::sync::Arc;

use super::retry::RetryPolicy;
use crate::domain::{ObjectError, Outcome, PolicyIndex, SuccessDetail, Task, TaskKind};
use crate::impls::pipeline::{Pipeline, PipelinedStore};
use crate::ports::ObjectStore;

pub struct TaskExecutor {
    /// Configured pipeline; used for deletes.
    objects: PipelinedStore,

    /// Pure stages only; used for every reconcile request.
    pure_objects: PipelinedStore,

    retry: RetryPolicy,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, pipeline: Pipeline, retry: RetryPolicy) -> Self {
        let pure = pipeline.restricted();
        Self {
            objects: PipelinedStore::new(Arc::clone(&store), pipeline),
            pure_objects: PipelinedStore::new(store, pure),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn execute(&self, task: &Task) -> Outcome {
        match task.kind {
            TaskKind::ExpireDelete => self.expire(task).await,
            TaskKind::PolicyReconcile {
                source_policy,
                dest_policy,
            } => self.reconcile(task, source_policy, dest_policy).await,
        }
    }

    async fn expire(&self, task: &Task) -> Outcome {
        let (result, attempts) = self
            .with_tries(task, "delete", || {
                self.objects.delete(&task.target, Some(task.scheduled_at))
            })
            .await;
        match result {
            Ok(()) => Outcome::success(SuccessDetail::Applied, attempts),
            Err(ObjectError::NotFound) => Outcome::success(SuccessDetail::AlreadyAbsent, attempts),
            Err(ObjectError::PreconditionFailed) => {
                tracing::debug!(task = %task.id, target = %task.target, "expiry changed since enqueue; skipping delete");
                Outcome::success(SuccessDetail::Superseded, attempts)
            }
            Err(e) => Outcome::transient(format!("delete {}: {e}", task.target), attempts),
        }
    }

    async fn reconcile(&self, task: &Task, source: PolicyIndex, dest: PolicyIndex) -> Outcome {
        let (read, read_attempts) = self
            .with_tries(task, "get", || self.pure_objects.get(&task.target, source))
            .await;
        let object = match read {
            Ok(object) => object,
            Err(e) => {
                return Outcome::transient(
                    format!("read {} under policy {source}: {e}", task.target),
                    read_attempts,
                );
            }
        };

        let (written, write_attempts) = self
            .with_tries(task, "put", || {
                self.pure_objects.put(&task.target, dest, object.clone())
            })
            .await;
        let attempts = read_attempts + write_attempts;
        match written {
            Ok(()) => Outcome::success(SuccessDetail::Applied, attempts),
            Err(e) => Outcome::transient(
                format!("write {} under policy {dest}: {e}", task.target),
                attempts,
            ),
        }
    }

    /// Run `op` until it returns something other than a transient error or
    /// the tries are used up. Returns the last result and the request count.
    async fn with_tries<T, F, Fut>(&self, task: &Task, method: &str, mut op: F) -> (Result<T, ObjectError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ObjectError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Err(e) if e.is_transient() && self.retry.has_more(attempts) => {
                    let delay = self.retry.next_delay(attempts);
                    tracing::debug!(
                        task = %task.id,
                        target = %task.target,
                        method,
                        attempt = attempts,
                        error = %e,
                        "request failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                result => return (result, attempts),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObjectPath, OutcomeKind};
    use crate::impls::InMemoryObjectStore;
    use crate::impls::pipeline::{Middleware, MiddlewareClass, SYMLINK_TARGET_META};
    use crate::ports::{DELETE_AT_META, StoredObject};
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn path(s: &str) -> ObjectPath {
        ObjectPath::parse(s).unwrap()
    }

    fn executor(store: &InMemoryObjectStore, pipeline: Pipeline, tries: u32) -> TaskExecutor {
        TaskExecutor::new(Arc::new(store.clone()), pipeline, RetryPolicy::immediate(tries))
    }

    fn expiring(delete_at: i64) -> StoredObject {
        StoredObject::new("payload").with_meta(DELETE_AT_META, delete_at.to_string())
    }

    /// Reverses the body; stands in for encryption.
    struct Reverse;

    impl Middleware for Reverse {
        fn name(&self) -> &str {
            "reverse"
        }

        fn class(&self) -> MiddlewareClass {
            MiddlewareClass::Transformative
        }

        fn filter_response(&self, _path: &ObjectPath, mut object: StoredObject) -> StoredObject {
            let mut body = object.body.to_vec();
            body.reverse();
            object.body = body.into();
            object
        }
    }

    #[tokio::test]
    async fn expire_deletes_matching_object() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store.put(&target, PolicyIndex(0), expiring(100)).await.unwrap();

        let task = Task::expiration(target.clone(), at(100), at(0));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;

        assert_eq!(outcome, Outcome::success(SuccessDetail::Applied, 1));
        assert!(store.policies(&target).await.is_empty());
    }

    #[tokio::test]
    async fn expire_of_absent_object_is_success() {
        let store = InMemoryObjectStore::new();
        let task = Task::expiration(path("/a/c/gone"), at(100), at(0));
        let exec = executor(&store, Pipeline::default(), 3);

        let first = exec.execute(&task).await;
        let again = exec.execute(&task).await;
        assert_eq!(first.detail, Some(SuccessDetail::AlreadyAbsent));
        assert_eq!(again.detail, Some(SuccessDetail::AlreadyAbsent));
    }

    #[tokio::test]
    async fn expire_skips_object_with_new_expiry() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store.put(&target, PolicyIndex(0), expiring(500)).await.unwrap();

        let task = Task::expiration(target.clone(), at(100), at(0));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;

        assert_eq!(outcome.detail, Some(SuccessDetail::Superseded));
        assert!(store.peek(&target, PolicyIndex(0)).await.is_some());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_within_request_tries() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store.put(&target, PolicyIndex(0), expiring(100)).await.unwrap();
        store.fail_next(2).await;

        let task = Task::expiration(target, at(100), at(0));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;
        assert_eq!(outcome, Outcome::success(SuccessDetail::Applied, 3));
    }

    #[tokio::test]
    async fn exhausted_tries_yield_transient_failure() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store.make_unavailable(&target).await;

        let task = Task::expiration(target, at(100), at(0));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;
        assert_eq!(outcome.kind, OutcomeKind::TransientFailure);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.reason.unwrap().contains("/a/c/o"));
    }

    #[tokio::test]
    async fn backoff_grows_between_tries() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store.make_unavailable(&target).await;

        let exec = TaskExecutor::new(
            Arc::new(store.clone()),
            Pipeline::default(),
            RetryPolicy::new(3, Duration::from_millis(20)),
        );
        let started = std::time::Instant::now();
        let outcome = exec
            .execute(&Task::expiration(target, at(100), at(0)))
            .await;

        assert_eq!(outcome.attempts, 3);
        // 20ms + 40ms
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn reconcile_copies_bytes_and_metadata() {
        let store = InMemoryObjectStore::new();
        let target = path("/AUTH_a/photos/2024/cat.jpg");
        let original = StoredObject::new(vec![0u8, 1, 2, 255])
            .with_meta("content-type", "image/jpeg")
            .with_meta("x-object-meta-owner", "alice");
        store
            .put(&target, PolicyIndex(0), original.clone())
            .await
            .unwrap();

        let task = Task::reconcile(target.clone(), PolicyIndex(0), PolicyIndex(2), at(10), at(10));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;

        assert!(outcome.is_success());
        assert_eq!(store.peek(&target, PolicyIndex(2)).await, Some(original.clone()));
        // source のコピーは残る
        assert_eq!(store.peek(&target, PolicyIndex(0)).await, Some(original));
    }

    #[tokio::test]
    async fn reconcile_bypasses_impure_middleware() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/link");
        let original = StoredObject::new("abc").with_meta(SYMLINK_TARGET_META, "a/c/elsewhere");
        store
            .put(&target, PolicyIndex(1), original.clone())
            .await
            .unwrap();
        store
            .put(&path("/a/c/elsewhere"), PolicyIndex(1), StoredObject::new("other"))
            .await
            .unwrap();

        let pipeline = Pipeline::from_names("catch_errors symlink")
            .unwrap()
            .with_stage(Arc::new(Reverse));
        let task = Task::reconcile(target.clone(), PolicyIndex(1), PolicyIndex(0), at(10), at(10));
        let outcome = executor(&store, pipeline, 1).execute(&task).await;

        assert!(outcome.is_success());
        assert_eq!(store.peek(&target, PolicyIndex(0)).await, Some(original));
    }

    #[tokio::test]
    async fn reconcile_with_missing_source_stays_pending() {
        let store = InMemoryObjectStore::new();
        let task = Task::reconcile(path("/a/c/o"), PolicyIndex(0), PolicyIndex(1), at(10), at(10));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;

        assert_eq!(outcome.kind, OutcomeKind::TransientFailure);
        // NotFound は繰り返さない
        assert_eq!(outcome.attempts, 1);
        assert!(store.policies(&path("/a/c/o")).await.is_empty());
    }

    #[tokio::test]
    async fn reconcile_counts_requests_of_both_phases() {
        let store = InMemoryObjectStore::new();
        let target = path("/a/c/o");
        store
            .put(&target, PolicyIndex(0), StoredObject::new("x"))
            .await
            .unwrap();
        store.fail_next(1).await;

        let task = Task::reconcile(target, PolicyIndex(0), PolicyIndex(1), at(10), at(10));
        let outcome = executor(&store, Pipeline::default(), 3).execute(&task).await;
        assert_eq!(outcome, Outcome::success(SuccessDetail::Applied, 3));
    }
}

//! DaemonBuilder - daemon の構築とワイヤリング
//!
//! # 起動時検証（Fail-fast 設計）
//! - 設定は build() 時に再検証する
//! - 必須の collaborator（TaskStore, ObjectStore）が無ければ BuildError
//! - それ以外は既定の実装で埋める
//!   （SystemClock, TracingEventSink, ReconCacheSink, ReclaimDecider）

use std::sync::Arc;

use super::config::{ConfigError, DaemonConfig};
use super::controller::RetryController;
use super::enumerator::TaskEnumerator;
use super::executor::TaskExecutor;
use super::scheduler::Daemon;
use crate::domain::{Decider, ReclaimDecider};
use crate::impls::pipeline::Middleware;
use crate::impls::{ReconCacheSink, TracingEventSink};
use crate::ports::{Clock, EventSink, ObjectStore, StatusSink, SystemClock, TaskStore};

/// # 使用例
/// ```ignore
/// let daemon = DaemonBuilder::new(config)
///     .task_store(Arc::new(tasks))
///     .object_store(Arc::new(objects))
///     .build()?;
/// let snapshot = daemon.run_once().await;
/// ```
pub struct DaemonBuilder {
    config: DaemonConfig,
    task_store: Option<Arc<dyn TaskStore>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    status: Option<Arc<dyn StatusSink>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    decider: Option<Arc<dyn Decider>>,
    extra_stages: Vec<Arc<dyn Middleware>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be provided before build().")]
    MissingCollaborators(Vec<&'static str>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DaemonBuilder {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            task_store: None,
            object_store: None,
            status: None,
            events: None,
            clock: None,
            decider: None,
            extra_stages: Vec::new(),
        }
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Defaults to a [`ReconCacheSink`] under `recon_cache_path`.
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = Some(sink);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the age-bounded retry rule.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Append a stage after the configured `pipeline` names.
    pub fn middleware(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.extra_stages.push(stage);
        self
    }

    pub fn build(self) -> Result<Daemon, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.task_store.is_none() {
            missing.push("task_store");
        }
        if self.object_store.is_none() {
            missing.push("object_store");
        }
        let (Some(task_store), Some(object_store)) = (self.task_store, self.object_store) else {
            return Err(BuildError::MissingCollaborators(missing));
        };

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(TracingEventSink));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(ReclaimDecider::new(config.reclaim_age)));
        let status = self.status.unwrap_or_else(|| {
            Arc::new(ReconCacheSink::new(
                config.recon_cache_file(),
                recon_key(&config),
            ))
        });

        let pipeline = self
            .extra_stages
            .into_iter()
            .fold(config.build_pipeline()?, |p, stage| p.with_stage(stage));

        let enumerator = TaskEnumerator::new(
            Arc::clone(&task_store),
            Arc::clone(&clock),
            config.kind.namespace(),
            config.partitioner(),
            Arc::new(config.delays.clone()),
            config.round_robin_task_cache_size,
        );
        let executor = TaskExecutor::new(object_store, pipeline, config.retry_policy());
        let controller = RetryController::new(task_store, decider, events, Arc::clone(&clock));

        tracing::debug!(
            daemon = config.kind.section(),
            concurrency = config.concurrency,
            delays = config.delays.len(),
            "daemon wired"
        );
        Ok(Daemon::new(config, enumerator, executor, controller, status, clock))
    }
}

/// Cooperating processes on one host share the recon file, so each one
/// gets its own entry.
fn recon_key(config: &DaemonConfig) -> String {
    let key = config.kind.recon_key();
    if config.processes > 1 {
        format!("{key}_{}", config.process)
    } else {
        key.to_string()
    }
}

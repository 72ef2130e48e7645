//! Daemon - サイクルの駆動
//!
//! 1 サイクル: listing → (最大 `concurrency` 並列で) execute → settle → 集計。
//! サイクル中も `report_interval` ごとに途中経過を StatusSink に送り、
//! 終了時に最終スナップショットを送る。
//!
//! `run_forever` は最初にランダムな jitter だけ待ち、以後 `interval` 間隔で回す。
//! shutdown が来たら実行中のタスクは捨てる（エントリは消えていないので次回やり直される）。

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::DaemonConfig;
use super::controller::RetryController;
use super::enumerator::{Listed, TaskEnumerator};
use super::executor::TaskExecutor;
use super::status::{CycleCounts, ProgressSnapshot};
use crate::domain::TaskState;
use crate::ports::{Clock, StatusSink};

/// How one listed item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tally {
    Settled(TaskState),
    Malformed(TaskState),
    NotDue,
    ListingFailed,
}

impl Tally {
    fn add_to(self, counts: &mut CycleCounts) {
        match self {
            Tally::Settled(TaskState::Succeeded) => counts.succeeded += 1,
            Tally::Settled(TaskState::Abandoned) => counts.abandoned += 1,
            Tally::Settled(TaskState::Pending) => counts.failed += 1,
            Tally::Malformed(state) => {
                counts.errors += 1;
                if state.is_terminal() {
                    counts.abandoned += 1;
                }
            }
            Tally::NotDue => counts.not_due += 1,
            Tally::ListingFailed => {}
        }
    }
}

pub struct Daemon {
    config: DaemonConfig,
    enumerator: TaskEnumerator,
    executor: TaskExecutor,
    controller: RetryController,
    status: Arc<dyn StatusSink>,
    clock: Arc<dyn Clock>,
}

impl Daemon {
    /// Use [`DaemonBuilder`](super::builder::DaemonBuilder) to wire one.
    pub(crate) fn new(
        config: DaemonConfig,
        enumerator: TaskEnumerator,
        executor: TaskExecutor,
        controller: RetryController,
        status: Arc<dyn StatusSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            enumerator,
            executor,
            controller,
            status,
            clock,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Run one full cycle and return its final snapshot.
    pub async fn run_once(&self) -> ProgressSnapshot {
        let daemon = self.config.kind.section();
        let cycle_started_at = self.clock.now();
        let started = Instant::now();
        tracing::info!(
            daemon,
            process = self.config.process,
            processes = self.config.processes,
            "cycle begin"
        );

        let mut counts = CycleCounts::default();
        let mut last_report = Instant::now();
        let mut tallies = std::pin::pin!(
            self.enumerator
                .listing()
                .map(|item| self.process(item))
                .buffer_unordered(self.config.concurrency)
        );

        while let Some(tally) = tallies.next().await {
            tally.add_to(&mut counts);
            if last_report.elapsed() >= self.config.report_interval {
                let snapshot = self.snapshot(cycle_started_at, started, counts, false);
                tracing::info!(daemon, progress = %snapshot.summary(), "cycle in progress");
                self.report(&snapshot).await;
                last_report = Instant::now();
            }
        }

        let snapshot = self.snapshot(cycle_started_at, started, counts, true);
        tracing::info!(daemon, result = %snapshot.summary(), "cycle complete");
        self.report(&snapshot).await;
        snapshot
    }

    /// Cycle until `shutdown` turns true (or its sender is dropped).
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval;
        let jitter = interval.mul_f64(rand::random::<f64>());
        tracing::info!(
            daemon = self.config.kind.section(),
            jitter_secs = jitter.as_secs_f64(),
            interval_secs = interval.as_secs_f64(),
            "daemon starting"
        );
        if sleep_or_shutdown(jitter, &mut shutdown).await {
            return;
        }

        loop {
            let started = Instant::now();
            tokio::select! {
                _ = self.run_once() => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!(daemon = self.config.kind.section(), "shutdown during cycle; in-flight tasks stay pending");
                    return;
                }
            }
            let pause = interval.saturating_sub(started.elapsed());
            if sleep_or_shutdown(pause, &mut shutdown).await {
                return;
            }
        }
    }

    /// Run [`run_forever`](Self::run_forever) on the runtime.
    pub fn spawn(self: Arc<Self>) -> DaemonHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            self.run_forever(shutdown_rx).await;
        });
        DaemonHandle { shutdown_tx, join }
    }

    async fn process(&self, item: Listed) -> Tally {
        match item {
            Listed::Due(task) => {
                let outcome = self.executor.execute(&task).await;
                Tally::Settled(self.controller.settle(&task, &outcome).await)
            }
            Listed::NotDue { task, due_at } => {
                tracing::trace!(scope = %task.scope, task = %task.id, %due_at, "not due yet");
                Tally::NotDue
            }
            Listed::Malformed {
                scope,
                entry,
                error,
            } => Tally::Malformed(self.controller.settle_malformed(&scope, &entry, &error).await),
            Listed::ListingFailed { scope, error } => {
                let scope = scope
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| self.config.kind.namespace().account_str().to_string());
                tracing::warn!(%scope, %error, "listing failed; skipping until next cycle");
                Tally::ListingFailed
            }
        }
    }

    fn snapshot(
        &self,
        cycle_started_at: DateTime<Utc>,
        started: Instant,
        counts: CycleCounts,
        complete: bool,
    ) -> ProgressSnapshot {
        ProgressSnapshot {
            daemon: self.config.kind.section().to_string(),
            process: self.config.process,
            processes: self.config.processes,
            cycle_started_at,
            elapsed_secs: started.elapsed().as_secs_f64(),
            counts,
            complete,
        }
    }

    async fn report(&self, snapshot: &ProgressSnapshot) {
        if let Err(e) = self.status.report(snapshot).await {
            tracing::warn!(error = %e, "could not write status snapshot");
        }
    }
}

/// Handle to a spawned daemon.
/// - `request_shutdown` で停止を要求（実行中のサイクルは中断される）
/// - `shutdown_and_join` で停止を待つ
pub struct DaemonHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    pub fn request_shutdown(&self) {
        // receiver が既に居なくてもよい
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "daemon task panicked");
        }
    }
}

/// Returns when shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration`; `true` if shutdown came first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

//! Config - daemon ごとの設定
//!
//! TOML の `[object-expirer]` / `[container-reconciler]` セクションを読む。
//! 設定は明示的な値として各コンポーネントへ渡す（グローバル状態にしない）。
//! 不正な値は起動時に ConfigError で落とす。

use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::delay::{DELAY_KEY_PREFIX, DelayPolicy};
use super::partition::Partitioner;
use super::retry::RetryPolicy;
use crate::domain::TaskNamespace;
use crate::impls::pipeline::{Pipeline, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("missing section [{0}]")]
    MissingSection(&'static str),

    #[error("process = {process} is out of range for processes = {processes}")]
    InvalidPartition { process: u32, processes: u32 },

    #[error("malformed delay key {key}: {reason}")]
    MalformedDelayKey { key: String, reason: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Which daemon a configuration section drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonKind {
    ObjectExpirer,
    ContainerReconciler,
}

impl DaemonKind {
    pub const ALL: [DaemonKind; 2] = [DaemonKind::ObjectExpirer, DaemonKind::ContainerReconciler];

    /// TOML section name, also used as the daemon name in logs and snapshots.
    pub fn section(self) -> &'static str {
        match self {
            DaemonKind::ObjectExpirer => "object-expirer",
            DaemonKind::ContainerReconciler => "container-reconciler",
        }
    }

    pub fn namespace(self) -> TaskNamespace {
        match self {
            DaemonKind::ObjectExpirer => TaskNamespace::Expirer,
            DaemonKind::ContainerReconciler => TaskNamespace::Reconciler,
        }
    }

    pub fn recon_file(self) -> &'static str {
        match self {
            DaemonKind::ObjectExpirer => "object.recon",
            DaemonKind::ContainerReconciler => "container.recon",
        }
    }

    /// Key of this daemon's entry inside the recon file.
    pub fn recon_key(self) -> &'static str {
        match self {
            DaemonKind::ObjectExpirer => "object_expirer",
            DaemonKind::ContainerReconciler => "container_reconciler",
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

impl FromStr for DaemonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DaemonKind::ALL
            .into_iter()
            .find(|k| k.section() == s)
            .ok_or_else(|| format!("unknown daemon {s:?} (expected object-expirer or container-reconciler)"))
    }
}

// 数値は整数・小数どちらでも受ける
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSection {
    interval: Option<f64>,
    report_interval: Option<f64>,
    request_tries: Option<u32>,
    concurrency: Option<usize>,
    processes: Option<u32>,
    process: Option<u32>,
    reclaim_age: Option<f64>,
    round_robin_task_cache_size: Option<usize>,
    recon_cache_path: Option<PathBuf>,
    pipeline: Option<String>,
    log_level: Option<String>,
    retry_backoff: Option<f64>,

    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub kind: DaemonKind,
    pub interval: Duration,
    pub report_interval: Duration,
    pub request_tries: u32,
    pub concurrency: usize,
    pub processes: u32,
    pub process: u32,
    pub reclaim_age: TimeDelta,
    pub round_robin_task_cache_size: usize,
    pub recon_cache_path: PathBuf,
    /// Whitespace-separated middleware names.
    pub pipeline: String,
    pub log_level: String,
    pub retry_backoff: Duration,
    pub delays: DelayPolicy,
}

impl DaemonConfig {
    pub fn defaults(kind: DaemonKind) -> Self {
        Self {
            kind,
            interval: Duration::from_secs(300),
            report_interval: Duration::from_secs(300),
            request_tries: 3,
            concurrency: 1,
            processes: 0,
            process: 0,
            reclaim_age: TimeDelta::seconds(604_800),
            round_robin_task_cache_size: 10_000,
            recon_cache_path: PathBuf::from("/var/cache/swift"),
            pipeline: Pipeline::DEFAULT.to_string(),
            log_level: "info".to_string(),
            retry_backoff: Duration::ZERO,
            delays: DelayPolicy::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>, kind: DaemonKind) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, kind)
    }

    pub fn from_toml_str(text: &str, kind: DaemonKind) -> Result<Self, ConfigError> {
        let mut doc: toml::Table = toml::from_str(text)?;
        let section = doc
            .remove(kind.section())
            .ok_or(ConfigError::MissingSection(kind.section()))?;
        Self::from_section(kind, section)
    }

    fn from_section(kind: DaemonKind, section: toml::Value) -> Result<Self, ConfigError> {
        let raw: RawSection = section.try_into()?;
        let mut config = Self::defaults(kind);

        if let Some(v) = raw.interval {
            config.interval = seconds("interval", v)?;
        }
        if let Some(v) = raw.report_interval {
            config.report_interval = seconds("report_interval", v)?;
        }
        if let Some(v) = raw.reclaim_age {
            let d = seconds("reclaim_age", v)?;
            config.reclaim_age = TimeDelta::from_std(d).map_err(|e| ConfigError::InvalidValue {
                key: "reclaim_age",
                reason: e.to_string(),
            })?;
        }
        if let Some(v) = raw.retry_backoff {
            config.retry_backoff = seconds("retry_backoff", v)?;
        }
        if let Some(v) = raw.request_tries {
            config.request_tries = v;
        }
        if let Some(v) = raw.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = raw.processes {
            config.processes = v;
        }
        if let Some(v) = raw.process {
            config.process = v;
        }
        if let Some(v) = raw.round_robin_task_cache_size {
            config.round_robin_task_cache_size = v;
        }
        if let Some(v) = raw.recon_cache_path {
            config.recon_cache_path = v;
        }
        if let Some(v) = raw.pipeline {
            config.pipeline = v;
        }
        if let Some(v) = raw.log_level {
            config.log_level = v;
        }

        for (key, value) in &raw.extra {
            match key.strip_prefix(DELAY_KEY_PREFIX) {
                Some(suffix) => config.delays.insert_raw(suffix, value)?,
                None => tracing::warn!(section = kind.section(), %key, "ignoring unknown config key"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let at_least_one = |key: &'static str, v: u64| {
            if v == 0 {
                Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be at least 1".into(),
                })
            } else {
                Ok(())
            }
        };
        at_least_one("concurrency", self.concurrency as u64)?;
        at_least_one("request_tries", u64::from(self.request_tries))?;
        at_least_one("round_robin_task_cache_size", self.round_robin_task_cache_size as u64)?;

        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "interval",
                reason: "must be greater than 0".into(),
            });
        }

        let partition_ok = if self.processes == 0 {
            self.process == 0
        } else {
            self.process < self.processes
        };
        if !partition_ok {
            return Err(ConfigError::InvalidPartition {
                process: self.process,
                processes: self.processes,
            });
        }

        self.build_pipeline()?;
        Ok(())
    }

    pub fn partitioner(&self) -> Partitioner {
        Partitioner::new(self.process, self.processes)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.request_tries, self.retry_backoff)
    }

    pub fn build_pipeline(&self) -> Result<Pipeline, ConfigError> {
        Ok(Pipeline::from_names(&self.pipeline)?)
    }

    pub fn recon_cache_file(&self) -> PathBuf {
        self.recon_cache_path.join(self.kind.recon_file())
    }
}

fn seconds(key: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("expected a non-negative number of seconds, got {secs}"),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
    })
}

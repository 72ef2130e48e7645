//! ReconCacheSink - スナップショットを JSON ファイルへ書き出す
//!
//! ファイルは他の daemon と共有する JSON object。
//! 自分のキーだけを置き換え、一時ファイル + rename でアトミックに書く。

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::app::status::ProgressSnapshot;
use crate::ports::{StatusError, StatusSink};

pub struct ReconCacheSink {
    path: PathBuf,
    key: String,
    // 同一プロセス内の書き込みを直列化する
    write_lock: Mutex<()>,
}

impl ReconCacheSink {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn merge_into_file(path: &Path, key: &str, value: serde_json::Value) -> Result<(), StatusError> {
    let mut root = match std::fs::read(path) {
        Ok(raw) if !raw.is_empty() => match serde_json::from_slice(&raw) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return Err(StatusError::NotAnObject(path.display().to_string())),
            Err(e) => {
                // 壊れたファイルは作り直す
                tracing::warn!(path = %path.display(), error = %e, "recon cache unreadable; rewriting");
                serde_json::Map::new()
            }
        },
        Ok(_) => serde_json::Map::new(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
        Err(e) => return Err(e.into()),
    };
    root.insert(key.to_string(), value);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &root)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| StatusError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl StatusSink for ReconCacheSink {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<(), StatusError> {
        let _guard = self.write_lock.lock().await;
        let value = serde_json::to_value(snapshot)?;
        let path = self.path.clone();
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || merge_into_file(&path, &key, value))
            .await
            .map_err(|e| StatusError::Io(std::io::Error::other(e.to_string())))?
    }
}

/// Keeps every snapshot in memory (tests, CLI output).
#[derive(Clone, Default)]
pub struct MemoryStatusSink {
    snapshots: Arc<Mutex<Vec<ProgressSnapshot>>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().await.clone()
    }

    pub async fn last(&self) -> Option<ProgressSnapshot> {
        self.snapshots.lock().await.last().cloned()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<(), StatusError> {
        self.snapshots.lock().await.push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::status::CycleCounts;
    use chrono::DateTime;

    fn snapshot(succeeded: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            daemon: "object-expirer".into(),
            process: 0,
            processes: 0,
            cycle_started_at: DateTime::from_timestamp(100, 0).unwrap(),
            elapsed_secs: 0.25,
            counts: CycleCounts {
                succeeded,
                ..CycleCounts::default()
            },
            complete: true,
        }
    }

    #[tokio::test]
    async fn writes_snapshot_under_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReconCacheSink::new(dir.path().join("object.recon"), "object_expirer");

        sink.report(&snapshot(2)).await.unwrap();
        sink.report(&snapshot(5)).await.unwrap();

        let raw = std::fs::read(sink.path()).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(v["object_expirer"]["succeeded"], 5);
    }

    #[tokio::test]
    async fn preserves_keys_of_other_daemons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.recon");
        std::fs::write(&path, r#"{"object_updater_sweep": 1.5}"#).unwrap();

        let sink = ReconCacheSink::new(&path, "object_expirer");
        sink.report(&snapshot(1)).await.unwrap();

        let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(v["object_updater_sweep"], 1.5);
        assert_eq!(v["object_expirer"]["succeeded"], 1);
    }

    #[tokio::test]
    async fn creates_missing_cache_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache/container.recon");
        let sink = ReconCacheSink::new(&path, "container_reconciler");
        sink.report(&snapshot(0)).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn rewrites_unparsable_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.recon");
        std::fs::write(&path, "{\"object_expirer\": ").unwrap();

        let sink = ReconCacheSink::new(&path, "object_expirer");
        sink.report(&snapshot(3)).await.unwrap();
        sink.report(&snapshot(4)).await.unwrap();

        let v: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(v["object_expirer"]["succeeded"], 4);
    }

    #[tokio::test]
    async fn refuses_to_clobber_non_object_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.recon");
        std::fs::write(&path, "[1, 2]").unwrap();

        let sink = ReconCacheSink::new(&path, "object_expirer");
        let err = sink.report(&snapshot(0)).await.unwrap_err();
        assert!(matches!(err, StatusError::NotAnObject(_)));
    }
}

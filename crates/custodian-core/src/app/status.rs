//! Status - サイクルの進捗スナップショット
//!
//! サイクル終了時と、長いサイクルでは `report_interval` ごとに StatusSink へ送る。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounts {
    /// Side effect confirmed, entry removed.
    pub succeeded: u64,

    /// Transient failure, entry left for a later cycle.
    pub failed: u64,

    /// Older than reclaim_age, entry removed without success.
    pub abandoned: u64,

    /// Entries whose names could not be decoded.
    pub errors: u64,

    /// Entries seen but not yet due (scheduled_at + delay in the future).
    pub not_due: u64,
}

impl CycleCounts {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed + self.abandoned
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub daemon: String,
    pub process: u32,
    pub processes: u32,
    pub cycle_started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    #[serde(flatten)]
    pub counts: CycleCounts,
    /// `false` for mid-cycle reports.
    pub complete: bool,
}

impl ProgressSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} abandoned, {} errors, {} not due in {:.2}s",
            self.counts.succeeded,
            self.counts.failed,
            self.counts.abandoned,
            self.counts.errors,
            self.counts.not_due,
            self.elapsed_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_flattened_into_snapshot() {
        let snapshot = ProgressSnapshot {
            daemon: "object-expirer".into(),
            process: 0,
            processes: 0,
            cycle_started_at: DateTime::from_timestamp(0, 0).unwrap(),
            elapsed_secs: 1.5,
            counts: CycleCounts {
                succeeded: 3,
                abandoned: 1,
                ..CycleCounts::default()
            },
            complete: true,
        };
        let v = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(v["succeeded"], 3);
        assert_eq!(v["abandoned"], 1);
        assert_eq!(snapshot.counts.processed(), 4);
        assert!(snapshot.summary().starts_with("3 succeeded"));
    }
}

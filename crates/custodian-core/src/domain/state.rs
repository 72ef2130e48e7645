//! Task state machine.

use serde::{Deserialize, Serialize};

use super::Decision;

/// Per-task state, evaluated once per cycle per observed entry.
///
/// State transitions:
/// - Pending -> Succeeded (side effect confirmed, entry deleted)
/// - Pending -> Abandoned (older than reclaim_age, entry deleted)
/// - Pending -> Pending   (transient failure, entry untouched)
///
/// There are no in-place updates: an entry is either left alone or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Succeeded,
    Abandoned,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Abandoned)
    }

    /// State reached from `Pending` by applying `decision`.
    pub fn after(decision: &Decision) -> Self {
        match decision {
            Decision::Complete => TaskState::Succeeded,
            Decision::Abandon { .. } => TaskState::Abandoned,
            Decision::Retry { .. } => TaskState::Pending,
        }
    }
}

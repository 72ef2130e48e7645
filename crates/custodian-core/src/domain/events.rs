//! Events - タスクの処遇イベント
//!
//! controller が Decision を適用した結果を EventSink に流す。
//! abandonment はオペレータが気付けるよう必ず記録される。

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::ids::{ObjectPath, Scope, TaskId};
use super::task::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskSucceeded {
        scope: Scope,
        task: TaskId,
        target: ObjectPath,
        kind: TaskKind,
    },

    /// Left pending for a later cycle.
    TaskDeferred {
        scope: Scope,
        task: TaskId,
        reason: String,
    },

    TaskAbandoned {
        scope: Scope,
        task: TaskId,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<ObjectPath>,
        created_at: DateTime<Utc>,
        #[serde(serialize_with = "serialize_secs")]
        age: TimeDelta,
        reason: String,
    },
}

impl DomainEvent {
    pub fn task(&self) -> &TaskId {
        match self {
            DomainEvent::TaskSucceeded { task, .. }
            | DomainEvent::TaskDeferred { task, .. }
            | DomainEvent::TaskAbandoned { task, .. } => task,
        }
    }
}

fn serialize_secs<S: serde::Serializer>(age: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(age.num_seconds())
}

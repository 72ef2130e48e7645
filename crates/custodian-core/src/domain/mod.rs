//! Domain model (names, tasks, outcomes, decisions, events, errors).
//!
//! このモジュールはキュー・ストア・プロセスを前提にしない。
//! 「何を記録し、どう判断するか」の形だけを定義する。

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use decision::{Decider, Decision, ReclaimDecider};
pub use errors::{ObjectError, StoreError, TaskParseError};
pub use events::DomainEvent;
pub use ids::{
    AccountName, ContainerName, NameError, ObjectName, ObjectPath, PolicyIndex, Scope, TaskId,
};
pub use outcome::{Outcome, OutcomeKind, SuccessDetail};
pub use state::TaskState;
pub use task::{Task, TaskCursor, TaskEntry, TaskKind, TaskNamespace};

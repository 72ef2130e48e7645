//! Errors - エラー型と分類
//!
//! 分類:
//! - 一時的（Transient）: ネットワーク・可用性の問題。リトライ対象
//! - NotFound: delete 系タスクでは成功扱い
//! - 不正データ: 隠し名前空間のエントリ名が解読できない
//!
//! ConfigError は起動時の致命的エラーなので `app::config` にある。

use super::ids::{NameError, PolicyIndex};

/// Task store failure. Always retriable; "not found" is not an error here
/// (see [`crate::ports::DeleteStatus`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

/// Object store response other than success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("object not found")]
    NotFound,

    /// The conditional request did not match (e.g. `if_delete_at`).
    #[error("precondition failed")]
    PreconditionFailed,

    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

impl ObjectError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ObjectError::Unavailable(_))
    }
}

/// A hidden-namespace entry whose name does not decode into a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskParseError {
    #[error("task name has no '<timestamp>-' prefix: {0:?}")]
    MissingTimestamp(String),

    #[error("invalid task timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("task name has no '<source>:<dest>:' policy prefix: {0:?}")]
    MissingPolicies(String),

    #[error("invalid policy index {0:?}")]
    InvalidPolicy(String),

    #[error("source and destination policy are both {0}")]
    SamePolicy(PolicyIndex),

    #[error("{0:?} is not a task namespace")]
    UnknownNamespace(String),

    #[error(transparent)]
    Name(#[from] NameError),
}

//! StatusSink port - 進捗スナップショットの出力先

use async_trait::async_trait;

use crate::app::status::ProgressSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("status io: {0}")]
    Io(#[from] std::io::Error),

    #[error("status encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("status file {0} is not a JSON object")]
    NotAnObject(String),
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<(), StatusError>;
}

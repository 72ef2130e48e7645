//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore / InMemoryObjectStore**: 開発・テスト用（fault injection 付き）
//! - **Pipeline / PipelinedStore**: オブジェクトストア前段のミドルウェア列
//! - **ReconCacheSink**: JSON ファイルへのステータス出力
//! - **TracingEventSink**: tracing へのイベント出力

pub mod event_log;
pub mod inmem_object_store;
pub mod inmem_task_store;
pub mod pipeline;
pub mod recon_cache;

pub use self::event_log::{MemoryEventSink, TracingEventSink};
pub use self::inmem_object_store::InMemoryObjectStore;
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::pipeline::{Middleware, MiddlewareClass, Pipeline, PipelineError, PipelinedStore};
pub use self::recon_cache::{MemoryStatusSink, ReconCacheSink};

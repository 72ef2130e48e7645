//! App - アプリケーション層
//!
//! ports を組み合わせて daemon を実装する。
//!
//! # 主要コンポーネント
//! - **DaemonConfig**: 設定の読み込みと検証
//! - **DelayPolicy / Partitioner**: scope ごとの遅延と担当プロセスの決定
//! - **TaskEnumerator**: 1 サイクル分のタスク列（round-robin）
//! - **TaskExecutor**: 副作用の実行（request_tries 回まで）
//! - **RetryController**: 完了・放棄・再試行の適用
//! - **Daemon**: サイクルの駆動とステータス報告
//! - **DaemonBuilder**: ワイヤリングと起動時検証

pub mod builder;
pub mod config;
pub mod controller;
pub mod delay;
pub mod enqueue;
pub mod enumerator;
pub mod executor;
pub mod partition;
pub mod retry;
pub mod scheduler;
pub mod status;

pub use self::builder::{BuildError, DaemonBuilder};
pub use self::config::{ConfigError, DaemonConfig, DaemonKind};
pub use self::controller::RetryController;
pub use self::delay::DelayPolicy;
pub use self::enqueue::{EnqueueError, enqueue_expiration, enqueue_reconcile};
pub use self::enumerator::{Listed, TaskEnumerator};
pub use self::executor::TaskExecutor;
pub use self::partition::Partitioner;
pub use self::retry::RetryPolicy;
pub use self::scheduler::{Daemon, DaemonHandle};
pub use self::status::{CycleCounts, ProgressSnapshot};

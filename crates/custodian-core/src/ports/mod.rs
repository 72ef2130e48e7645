//! Ports - 抽象化レイヤー
//!
//! 外部システム（隠し名前空間、オブジェクトストア、ステータス出力、ログ）への
//! インターフェース。daemon はこれらの trait だけに依存する。
//!
//! # 設計原則
//! - タスクストアが唯一の正本。メモリ上の状態はサイクルをまたがない
//! - lease もロックも無い。安全性は冪等な副作用と決定的な分割で担保する

pub mod clock;
pub mod event_sink;
pub mod object_store;
pub mod status_sink;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::object_store::{DELETE_AT_META, ObjectStore, StoredObject};
pub use self::status_sink::{StatusError, StatusSink};
pub use self::task_store::{DeleteStatus, TaskStore};

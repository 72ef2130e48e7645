//! custodian-core
//!
//! Background maintenance daemons for an object store: an object expirer
//! and a container reconciler, both consuming tasks from a hidden namespace.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（names, task, outcome, decision, state, events, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, ObjectStore, StatusSink, EventSink, Clock）
//! - **impls**: 実装（in-memory ストア、ミドルウェア pipeline、recon cache）
//! - **app**: アプリケーションロジック（config, enumerator, executor, controller, daemon）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

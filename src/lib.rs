//! Five-section stock annotation store with chunked, snapshot-backed batch
//! transactions.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::RecordStore`]:
//! ```
//! use markstore::{core::store::RecordStore, op::MutationOp, types::{Section, StockKey}};
//!
//! let mut store = RecordStore::load("[TIPWORD]\n01600519=白酒/消费\n").expect("load");
//! let key = StockKey::resolve("600519").expect("key");
//! store
//!     .apply(Section::Tipword, &key, &MutationOp::Set("白马".to_string()))
//!     .expect("apply");
//! assert_eq!(store.get_tokens(&key).map(|t| t.joined()), Some("白酒/消费/白马".to_string()));
//! ```
//!
//! Batch usage with an in-memory sink:
//! ```
//! use markstore::{
//!     config::BatchConfig,
//!     core::store::RecordStore,
//!     engine::BatchEngine,
//!     op::MutationRequest,
//!     persist::memory::{MemorySink, MemorySnapshotStore},
//!     types::Section,
//! };
//!
//! let mut engine = BatchEngine::new(
//!     RecordStore::new(),
//!     Box::new(MemorySink::new()),
//!     Box::new(MemorySnapshotStore::new()),
//! );
//! let report = engine
//!     .run(&[MutationRequest::set(Section::Mark, "000001", "3")], &BatchConfig::default())
//!     .expect("batch");
//! assert_eq!(report.committed_chunks, 1);
//! ```
//!
//! Runtime usage backed by the mark file:
//! ```no_run
//! use markstore::{
//!     config::Settings,
//!     engine::BatchEngine,
//!     op::MutationRequest,
//!     runtime::{RuntimeConfig, spawn_marks},
//!     types::Section,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let settings = Settings::load("markstore.toml").expect("settings");
//! let engine = BatchEngine::open(&settings).expect("open");
//! let handle = spawn_marks(engine, RuntimeConfig::default());
//! let report = handle
//!     .run_batch(vec![MutationRequest::set(Section::Tip, "600519", "watch earnings")])
//!     .await
//!     .expect("batch");
//! println!("{:.1}% applied", report.overall_success_rate);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Store statistics, TIPWORD frequencies and store diffs.
pub mod analysis;
/// Settings file and batch configuration.
pub mod config;
/// Core in-memory store, merge policies and text codec.
pub mod core;
/// Chunked batch transaction engine.
pub mod engine;
/// Section values, token sets and stock views.
pub mod mark;
/// Mutation request model.
pub mod op;
/// Persistence abstractions and file, memory and SQLite implementations.
pub mod persist;
/// Read-through view cache.
pub mod query;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Stock keys, markets and sections.
pub mod types;
/// Request validation.
pub mod validate;

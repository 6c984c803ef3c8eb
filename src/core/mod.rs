//! In-memory record store, per-section tables, merge policies and codec.

/// Text codec for the persisted five-section layout.
pub mod codec;
/// Per-section merge policies.
pub mod merge;
/// Authoritative five-section record store.
pub mod store;
/// Insertion-ordered key to value table.
pub mod table;

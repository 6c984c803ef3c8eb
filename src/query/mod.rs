//! Read side: the shared published store and the view cache over it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::store::RecordStore;

pub mod cache;

pub use cache::{CacheStats, StockCache};

/// Committed store state as seen by readers. Only the batch engine takes the
/// write lock.
pub type SharedStore = Arc<RwLock<RecordStore>>;

/// What a caller asks the cache for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Views for these codes, in the given order. Unresolvable codes and
    /// keys present in no section are skipped.
    Keys(Vec<String>),
    /// Substring match over key, tip text and TIPWORD tokens, in store
    /// iteration order.
    Keyword(String),
}

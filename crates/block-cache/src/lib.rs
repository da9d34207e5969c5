//! Block Cache: a reorg-aware, bounded-depth block DAG with a single
//! canonical head, backed by a durable Block Item Store for crash recovery.

pub mod cache;
pub mod error;
pub mod item_store;

pub use cache::{AddResult, BlockCache, HasTransactionHashes};
pub use error::{Error, ErrorKind, Result};
pub use item_store::BlockItemStore;

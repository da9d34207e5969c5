//! Block Item Store: a durable side-table keyed by block-hash, organized
//! by logical namespace, layered over the generic [`pisa_store::Store`].
//!
//! The cache itself uses the `block-cache:stub` namespace to persist block
//! stubs for crash recovery: the Block Cache restores its graph by
//! scanning the store's block-stub namespace. Reducers (see
//! `reducer-framework`) use their own `block-cache:<component>` namespaces
//! for anchor states.

use std::sync::Arc;

use ethereum_types::H256;
use pisa_store::{Store, WriteBatch};
use pisa_types::BlockHeader;

use crate::error::Result;

const STUB_NAMESPACE: &str = "block-cache:stub";

/// Durable side-table for per-block derived items, shared by the Block
/// Cache and every registered anchor-state reducer.
#[derive(Clone)]
pub struct BlockItemStore {
    store: Arc<dyn Store>,
}

impl BlockItemStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        BlockItemStore { store }
    }

    pub fn namespace(component: &str) -> String {
        format!("block-cache:{component}")
    }

    pub fn get(&self, namespace: &str, hash: H256) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(namespace, hash.as_bytes())?)
    }

    pub fn put(&self, namespace: &str, hash: H256, value: &[u8]) -> Result<()> {
        Ok(self.store.put(namespace, hash.as_bytes(), value)?)
    }

    /// Removes every namespace's entry for `hash` in one atomic batch, so a
    /// pruned block's derived items never outlive the block itself.
    pub fn remove_block(&self, namespaces: &[String], hash: H256) -> Result<()> {
        let mut batch = WriteBatch::new();
        for namespace in namespaces {
            batch.delete(namespace, hash.as_bytes());
        }
        Ok(self.store.write_batch(batch)?)
    }

    pub fn put_stub(&self, header: &BlockHeader) -> Result<()> {
        let value = serde_json::to_vec(header).expect("BlockHeader serializes");
        self.put(STUB_NAMESPACE, header.hash, &value)
    }

    /// Scans the block-stub namespace to restore the cache's graph after a
    /// restart.
    pub fn restore_stubs(&self) -> Result<Vec<BlockHeader>> {
        Ok(self
            .store
            .scan(STUB_NAMESPACE)?
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .collect())
    }
}

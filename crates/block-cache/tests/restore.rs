//! Crash-recovery scenario: the Block Item Store persists block stubs, and
//! a fresh cache rebuilds its graph from them on restart.

use std::sync::Arc;

use block_cache::{BlockCache, BlockItemStore};
use ethereum_types::H256;
use pisa_store::MemoryStore;
use pisa_types::BlockHeader;

fn header(n: u64, hash: u64, parent: u64) -> BlockHeader {
    BlockHeader {
        hash: H256::from_low_u64_be(hash),
        number: n,
        parent_hash: H256::from_low_u64_be(parent),
    }
}

#[test]
fn cache_rebuilds_from_persisted_stubs_after_restart() {
    let store: Arc<dyn pisa_store::Store> = Arc::new(MemoryStore::new());
    let items = BlockItemStore::new(store.clone());

    let genesis = header(0, 1, 0);
    let block2 = header(1, 2, 1);
    items.put_stub(&genesis).unwrap();
    items.put_stub(&block2).unwrap();

    let restored = items.restore_stubs().unwrap();
    let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
    for stub in restored {
        cache.add_block(stub);
    }

    assert!(cache.has_block(H256::from_low_u64_be(1)));
    assert!(cache.has_block(H256::from_low_u64_be(2)));
    assert!(cache.is_attached(H256::from_low_u64_be(2)));
}

#[test]
fn pruned_blocks_can_be_swept_from_every_namespace() {
    let store: Arc<dyn pisa_store::Store> = Arc::new(MemoryStore::new());
    let items = BlockItemStore::new(store);
    let hash = H256::from_low_u64_be(7);
    let namespaces = vec![
        BlockItemStore::namespace("stub"),
        BlockItemStore::namespace("responder"),
    ];
    for namespace in &namespaces {
        items.put(namespace, hash, b"derived-item").unwrap();
    }
    items.remove_block(&namespaces, hash).unwrap();
    for namespace in &namespaces {
        assert!(items.get(namespace, hash).unwrap().is_none());
    }
}

//! Reducer-framework failures. A missing block underneath `state_at`
//! is a programming error in the caller (it must only be invoked on
//! attached, cache-resident blocks), so it is surfaced rather than masked.

error_chain::error_chain! {
    links {
        Store(pisa_store::Error, pisa_store::ErrorKind);
        Cache(block_cache::Error, block_cache::ErrorKind);
    }

    errors {
        MissingBlock(hash: ethereum_types::H256) {
            description("state_at called on a block absent from the cache")
            display("block {:?} is not present in the block cache", hash)
        }
        Corrupt(namespace: String, detail: String) {
            description("anchor state in the item store failed to decode")
            display("anchor state for namespace {} is corrupt: {}", namespace, detail)
        }
    }
}

//! Cache invariant violations: returned as a typed variant, treated by
//! the Block Processor as a bug and used to crash the component — never
//! silently absorbed.

error_chain::error_chain! {
    links {
        Store(pisa_store::Error, pisa_store::ErrorKind);
    }

    errors {
        NotFound(hash: ethereum_types::H256) {
            description("block not found in cache")
            display("block {:?} not found in cache", hash)
        }
        NotAttached(hash: ethereum_types::H256) {
            description("set_head target is not attached")
            display("block {:?} is not attached to the cache", hash)
        }
    }
}

//! Block Processor failures. A transient chain error is never surfaced
//! here — it is swallowed and logged at info inside `process_block_number`
//! itself. What reaches this type is either a cache invariant violation
//! (a bug) or a non-transient provider/store failure the caller must see.

error_chain::error_chain! {
    links {
        Cache(block_cache::Error, block_cache::ErrorKind);
        Provider(pisa_provider::Error, pisa_provider::ErrorKind);
        Store(pisa_store::Error, pisa_store::ErrorKind);
    }

    errors {
        /// A remote fetch for a block or its parent returned nothing
        /// outside of the declared-transient cases.
        BlockNotFound(number_or_hash: String) {
            description("remote provider returned no block")
            display("remote provider returned no block for {}", number_or_hash)
        }
        /// `add_listener`/`remove_listener` called outside `Running`.
        NotRunning {
            description("block processor is not running")
            display("block processor is not running")
        }
        /// `start` called from a state other than `Stopped`.
        AlreadyStarted {
            description("block processor already started")
            display("block processor already started")
        }
    }
}

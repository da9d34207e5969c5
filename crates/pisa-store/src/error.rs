//! Store errors. A read for a missing key is not an error condition callers
//! need to match with `downcast` gymnastics — `get` returns `Ok(None)` —
//! but a failed write is always an `Error`, never silently dropped.

error_chain::error_chain! {
    errors {
        /// The write batch touched a namespace/key combination twice with
        /// conflicting operations; reject rather than guess intent.
        ConflictingBatchEntry(namespace: String, key: Vec<u8>) {
            description("conflicting batch entry")
            display("namespace '{}' key {:?} written twice in the same batch", namespace, key)
        }
        /// The underlying storage medium refused the write (disk full, I/O
        /// error, etc). Always fatal: store write failure propagates and
        /// the service stops.
        Backend(detail: String) {
            description("store backend failure")
            display("store backend failure: {}", detail)
        }
        /// A stored value failed to deserialize back into its expected
        /// type — the record is corrupt or was written by an incompatible
        /// version.
        Corrupt(namespace: String, detail: String) {
            description("stored value failed to deserialize")
            display("corrupt record in namespace '{}': {}", namespace, detail)
        }
    }
}

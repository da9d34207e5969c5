//! Provider errors, distinguishing *transient chain errors* (null block,
//! "unknown block", RPC timeout — swallowed and retried) from everything
//! else (logged at error and re-raised); that classification lives on the
//! caller side via [`ErrorKind::is_transient`].

error_chain::error_chain! {
    errors {
        /// The remote returned a null block or a known transient
        /// "unknown block" condition.
        BlockFetching(detail: String) {
            description("transient error fetching a block")
            display("transient error fetching a block: {}", detail)
        }
        /// The RPC transport itself failed (timeout, connection reset).
        Transport(detail: String) {
            description("provider transport error")
            display("provider transport error: {}", detail)
        }
        /// `get_block_number` observed a height below the configured delay.
        BelowDelay(observed: u64, delay: u64) {
            description("observed block number below configured delay")
            display("observed block number {} is below configured delay {}", observed, delay)
        }
    }
}

impl ErrorKind {
    /// Transient errors are swallowed and logged at info; everything else
    /// is logged at error and re-raised.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::BlockFetching(_))
    }
}

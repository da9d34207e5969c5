//! Confirmation Observer failures. There is little here: registration and
//! cancellation are infallible, synchronous operations; the only failure
//! mode worth naming is a caller racing a cancel against an already-
//! settled registration.

error_chain::error_chain! {
    errors {
        /// The registration named by a `cancel` call had already settled
        /// (confirmed, reorged or timed out) or did not exist.
        UnknownRegistration(id: u64) {
            description("no such registration")
            display("registration {} is unknown or already settled", id)
        }
    }
}

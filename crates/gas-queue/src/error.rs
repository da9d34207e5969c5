//! Queue invariant violations: returned as a typed variant; the
//! Multi-Responder logs, reloads from the journal and retries on these.

error_chain::error_chain! {
    errors {
        Duplicate(identifier: String) {
            description("an item with this identifier is already queued")
            display("identifier {} is already queued", identifier)
        }
        NonContiguousConsume(nonce: u64, base_nonce: u64) {
            description("consume called below the queue's base nonce")
            display("cannot consume nonce {}: base_nonce is already {}", nonce, base_nonce)
        }
        UnknownIdentifier(identifier: String) {
            description("bump/replace referenced an identifier not in the queue")
            display("identifier {} is not queued", identifier)
        }
    }
}

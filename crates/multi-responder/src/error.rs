//! Multi-Responder failures. Queue invariant violations are not
//! fatal here: the caller logs, reloads from the journal and retries
//! (repeated failure is what escalates, one layer up).

error_chain::error_chain! {
    links {
        Queue(gas_queue::Error, gas_queue::ErrorKind);
        Store(pisa_store::Error, pisa_store::ErrorKind);
        Provider(pisa_provider::Error, pisa_provider::ErrorKind);
    }

    errors {
        /// `ReEnqueueMissingItems`/`TxMined` named an appointment the
        /// caller never supplied a request/identifier for.
        UnresolvedAppointment(id: ethereum_types::H256) {
            description("action references an appointment with no resolvable request")
            display("no resolvable request for appointment {:?}", id)
        }
        /// Signing failed — the signer is an external collaborator; any
        /// failure here is fatal ("signer unavailable").
        Signing(detail: String) {
            description("signing failed")
            display("signing failed: {}", detail)
        }
    }
}

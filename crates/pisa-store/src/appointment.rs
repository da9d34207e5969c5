//! Appointment store: a thin, read-mostly wrapper over [`Store`] that the
//! Responder Component and Multi-Responder consult to resolve
//! `appointmentId → Appointment`. Appointments are written once, outside
//! this crate's scope (by the Inspector-facing acceptance path), and read
//! here; the only mutation this wrapper performs itself is `mark_ended`,
//! driven by the Multi-Responder's `EndResponse` action.

use std::sync::Arc;

use ethereum_types::H256;

use crate::{ErrorKind, Result, Store};
use pisa_types::Appointment;

const NAMESPACE: &str = "appointment";
const ENDED_NAMESPACE: &str = "appointment-ended";

/// Read access to accepted appointments, keyed by `appointmentId`.
#[derive(Clone)]
pub struct AppointmentStore {
    store: Arc<dyn Store>,
}

impl AppointmentStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AppointmentStore { store }
    }

    fn key(appointment_id: H256) -> [u8; 32] {
        appointment_id.0
    }

    /// Persists `appointment`, keyed by its own id. Exposed for the
    /// Inspector-facing acceptance path and for test setup.
    pub fn put(&self, appointment: &Appointment) -> Result<()> {
        let bytes = serde_json::to_vec(appointment).expect("Appointment serializes");
        self.store.put(NAMESPACE, &Self::key(appointment.appointment_id), &bytes)
    }

    pub fn get(&self, appointment_id: H256) -> Result<Option<Appointment>> {
        match self.store.get(NAMESPACE, &Self::key(appointment_id))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ErrorKind::Corrupt(NAMESPACE.into(), e.to_string()).into()),
            None => Ok(None),
        }
    }

    pub fn is_ended(&self, appointment_id: H256) -> Result<bool> {
        Ok(self.store.get(ENDED_NAMESPACE, &Self::key(appointment_id))?.is_some())
    }

    /// Marks `appointment_id` as ended (the Multi-Responder's `EndResponse`
    /// action), without deleting the underlying appointment record.
    pub fn mark_ended(&self, appointment_id: H256) -> Result<()> {
        self.store.put(ENDED_NAMESPACE, &Self::key(appointment_id), &[1u8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use ethereum_types::{Address, U256};
    use pisa_types::PisaTransactionIdentifier;

    fn appointment(tag: u64) -> Appointment {
        Appointment {
            appointment_id: H256::from_low_u64_be(tag),
            customer_address: Address::from_low_u64_be(tag),
            identifier: PisaTransactionIdentifier {
                chain_id: 1,
                to: Address::from_low_u64_be(tag),
                data: parity_bytes::Bytes::new(),
                value: U256::zero(),
                gas_limit: U256::from(21_000),
            },
            start_block: 0,
            end_block: 100,
            confirmations_required: 5,
            event_topics: Vec::new(),
            payment_proof: parity_bytes::Bytes::new(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = AppointmentStore::new(Arc::new(MemoryStore::new()));
        let a = appointment(1);
        store.put(&a).unwrap();
        assert_eq!(store.get(a.appointment_id).unwrap(), Some(a));
    }

    #[test]
    fn unknown_appointment_is_none() {
        let store = AppointmentStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.get(H256::from_low_u64_be(9)).unwrap(), None);
    }

    #[test]
    fn mark_ended_is_observable_without_deleting_appointment() {
        let store = AppointmentStore::new(Arc::new(MemoryStore::new()));
        let a = appointment(2);
        store.put(&a).unwrap();
        assert!(!store.is_ended(a.appointment_id).unwrap());
        store.mark_ended(a.appointment_id).unwrap();
        assert!(store.is_ended(a.appointment_id).unwrap());
        assert!(store.get(a.appointment_id).unwrap().is_some());
    }
}

//! The appointment request consumed from the Inspector. The core trusts
//! the Inspector to have validated signatures, bytecode, dispute period
//! and round before handing an `Appointment` across this boundary.

use ethereum_types::{Address, H256};
use parity_bytes::Bytes;

use crate::transaction::PisaTransactionIdentifier;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Appointment {
    pub appointment_id: H256,
    pub customer_address: Address,
    pub identifier: PisaTransactionIdentifier,
    pub start_block: u64,
    pub end_block: u64,
    pub confirmations_required: u32,
    pub event_topics: Vec<H256>,
    pub payment_proof: Bytes,
}

//! Cryptographic primitives are an external collaborator — this module
//! owns only the signing interface the Multi-Responder consumes, plus a
//! deterministic fake for tests.

use ethereum_types::{Address, H256, U256};
use parity_bytes::Bytes;

use crate::error::{ErrorKind, Result};

/// An unsigned response transaction, ready to be signed with the
/// responder's nonce and the Gas Queue's chosen gas price.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: u64,
}

/// The signing wallet owned exclusively by the Multi-Responder — no other
/// component may sign.
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;
    fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes>;
}

/// Deterministic fake signer for tests: "signs" by encoding the nonce and
/// gas price into the payload so broadcast assertions can recover them
/// without a real ECDSA implementation.
pub struct FakeSigner {
    address: Address,
}

impl FakeSigner {
    pub fn new(address: Address) -> Self {
        FakeSigner { address }
    }
}

impl Signer for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, tx: &UnsignedTransaction) -> Result<Bytes> {
        if tx.gas_price.is_zero() {
            return Err(ErrorKind::Signing("refusing to sign a zero gas price transaction".into()).into());
        }
        let mut payload = Vec::new();
        payload.extend_from_slice(&tx.nonce.to_be_bytes());
        payload.extend_from_slice(&tx.gas_price.low_u64().to_be_bytes());
        payload.extend_from_slice(tx.to.as_bytes());
        Ok(Bytes::from(payload))
    }
}

/// Recovers the nonce a [`FakeSigner`]-signed payload was built for, for
/// test assertions against `FakeProvider::sent_transactions`.
pub fn decode_fake_nonce(raw: &[u8]) -> Option<u64> {
    raw.get(0..8).map(|bytes| u64::from_be_bytes(bytes.try_into().unwrap()))
}

pub fn dummy_hash_for(raw: &[u8]) -> H256 {
    let mut buf = [0u8; 32];
    let len = raw.len().min(32);
    buf[..len].copy_from_slice(&raw[..len]);
    H256::from(buf)
}

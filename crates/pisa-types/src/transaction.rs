//! Transactions as observed on chain, and the identifier PISA uses to
//! recognise "its" transaction regardless of which nonce or gas price it
//! was last broadcast with.

use ethereum_types::{Address, H256, U256};
use parity_bytes::Bytes;

/// `{ from, to, nonce, chainId, data, value, gasLimit, blockNumber }`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: U256,
    pub chain_id: u64,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub block_number: u64,
}

impl Transaction {
    /// Identifier this transaction would carry if it were a PISA response.
    pub fn identifier(&self) -> Option<PisaTransactionIdentifier> {
        Some(PisaTransactionIdentifier {
            chain_id: self.chain_id,
            to: self.to?,
            data: self.data.clone(),
            value: self.value,
            gas_limit: self.gas_limit,
        })
    }
}

/// `{ chainId, data, to, value, gasLimit }` — the tuple that makes two
/// response transactions interchangeable. Two queued items with equal
/// identifier are the same logical intent and serve as its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PisaTransactionIdentifier {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
}

//! On-chain log entries, as returned by `get_logs({ blockHash })`.

use ethereum_types::{Address, H256};
use parity_bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_hash: H256,
    pub block_number: u64,
}

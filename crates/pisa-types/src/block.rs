//! Block stubs and full blocks.
//!
//! The reducer framework (see `reducer-framework`) is generic over the block
//! shape: most reducers only need the stub (hash/number/parent), while the
//! Responder Component needs the full block with its transactions.

use ethereum_types::H256;

use crate::{log::Log, transaction::Transaction};

/// Anything that chains to a parent can be walked as ancestry.
pub trait BlockHeaderLike {
    fn hash(&self) -> H256;
    fn number(&self) -> u64;
    fn parent_hash(&self) -> H256;
}

/// `{ hash, number, parentHash }` — the minimal shape the Block Cache stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub hash: H256,
    pub number: u64,
    pub parent_hash: H256,
}

impl BlockHeaderLike for BlockHeader {
    fn hash(&self) -> H256 {
        self.hash
    }
    fn number(&self) -> u64 {
        self.number
    }
    fn parent_hash(&self) -> H256 {
        self.parent_hash
    }
}

/// A full block: header plus transactions and logs, fetched only by
/// reducers that need more than ancestry (e.g. the Responder Component).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub logs: Vec<Log>,
}

impl Block {
    pub fn stub(hash: H256, number: u64, parent_hash: H256) -> Self {
        Block {
            header: BlockHeader {
                hash,
                number,
                parent_hash,
            },
            transactions: Vec::new(),
            logs: Vec::new(),
        }
    }
}

impl BlockHeaderLike for Block {
    fn hash(&self) -> H256 {
        self.header.hash
    }
    fn number(&self) -> u64 {
        self.header.number
    }
    fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }
}

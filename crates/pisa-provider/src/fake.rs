//! An in-memory `Provider` fake for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use ethereum_types::{Address, H256, U256};
use parity_bytes::Bytes;
use parking_lot::RwLock;
use pisa_types::{Block, BlockHeader, Log};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::{Provider, Result};

#[derive(Default)]
struct Inner {
    blocks_by_hash: HashMap<H256, Block>,
    blocks_by_number: HashMap<u64, H256>,
    tx_block: HashMap<H256, H256>,
    nonces: HashMap<Address, U256>,
    balances: HashMap<Address, U256>,
    sent: Vec<Bytes>,
    head: u64,
    subscribers: Vec<UnboundedSender<u64>>,
}

/// A provider backed entirely by in-process state, for driving deterministic
/// tests against the Block Processor, Gas Queue and Multi-Responder.
#[derive(Default)]
pub struct FakeProvider {
    inner: RwLock<Inner>,
}

impl FakeProvider {
    pub fn new() -> Self {
        FakeProvider::default()
    }

    /// Seeds a block, indexing its transactions by hash for receipt lookups.
    pub fn push_block(&self, block: Block) {
        let mut inner = self.inner.write();
        for tx in &block.transactions {
            inner.tx_block.insert(tx.hash, block.header.hash);
        }
        inner.blocks_by_number.insert(block.header.number, block.header.hash);
        inner.head = inner.head.max(block.header.number);
        inner.blocks_by_hash.insert(block.header.hash, block);
    }

    pub fn set_nonce(&self, address: Address, nonce: U256) {
        self.inner.write().nonces.insert(address, nonce);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.inner.write().balances.insert(address, balance);
    }

    pub fn sent_transactions(&self) -> Vec<Bytes> {
        self.inner.read().sent.clone()
    }

    /// Pushes `number` to every subscriber registered via
    /// `subscribe_new_blocks`, simulating the provider's "new block"
    /// notification.
    pub fn notify_new_block(&self, number: u64) {
        let mut inner = self.inner.write();
        inner.subscribers.retain(|tx| tx.send(number).is_ok());
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn get_block_by_hash(&self, hash: H256) -> Result<Option<Block>> {
        Ok(self.inner.read().blocks_by_hash.get(&hash).cloned())
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .blocks_by_number
            .get(&number)
            .and_then(|hash| inner.blocks_by_hash.get(hash))
            .cloned())
    }

    async fn get_block_header_by_hash(&self, hash: H256) -> Result<Option<BlockHeader>> {
        Ok(self
            .inner
            .read()
            .blocks_by_hash
            .get(&hash)
            .map(|b| b.header))
    }

    async fn get_transaction_receipt_block(&self, tx_hash: H256) -> Result<Option<H256>> {
        Ok(self.inner.read().tx_block.get(&tx_hash).copied())
    }

    async fn get_block_number(&self) -> Result<u64> {
        Ok(self.inner.read().head)
    }

    async fn get_logs(&self, block_hash: H256) -> Result<Vec<Log>> {
        Ok(self
            .inner
            .read()
            .blocks_by_hash
            .get(&block_hash)
            .map(|b| b.logs.clone())
            .unwrap_or_default())
    }

    async fn get_transaction_count(&self, address: Address) -> Result<U256> {
        Ok(self
            .inner
            .read()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_gas(&self, _to: Address, _data: &Bytes) -> Result<U256> {
        Ok(U256::from(21_000))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let mut inner = self.inner.write();
        inner.sent.push(raw.clone());
        Ok(H256::from_low_u64_be(inner.sent.len() as u64))
    }

    async fn subscribe_new_blocks(&self) -> Result<mpsc::UnboundedReceiver<u64>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().subscribers.push(tx);
        Ok(rx)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        Ok(self.inner.read().balances.get(&address).copied().unwrap_or_default())
    }
}

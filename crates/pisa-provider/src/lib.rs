//! The chain JSON-RPC client is an external collaborator; this crate owns
//! only the interface the core consumes from it, plus a "delay" adapter
//! and an in-memory fake for tests.

pub mod error;
pub mod fake;

use async_trait::async_trait;
use ethereum_types::{H256, U256};
use parity_bytes::Bytes;
use pisa_types::{Block, BlockHeader, Log};

pub use error::{Error, ErrorKind, Result};

/// Methods the core requires from the chain client.
///
/// Every method here is a suspension point: the only operations in the
/// core allowed to `.await` are provider RPC calls, block fetches inside
/// ancestor walks, store commits, and broadcast calls.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_block_by_hash(&self, hash: H256) -> Result<Option<Block>>;
    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>>;
    async fn get_block_header_by_hash(&self, hash: H256) -> Result<Option<BlockHeader>>;
    async fn get_transaction_receipt_block(&self, tx_hash: H256) -> Result<Option<H256>>;
    async fn get_block_number(&self) -> Result<u64>;
    async fn get_logs(&self, block_hash: H256) -> Result<Vec<Log>>;
    async fn get_transaction_count(&self, address: ethereum_types::Address) -> Result<U256>;
    async fn estimate_gas(&self, to: ethereum_types::Address, data: &Bytes) -> Result<U256>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;
    /// Required by the Multi-Responder's `CheckResponderBalance` action —
    /// the same `eth_getBalance` every Ethereum JSON-RPC provider exposes.
    async fn get_balance(&self, address: ethereum_types::Address) -> Result<U256>;

    /// `subscribe("block") -> stream<u64>`: a channel of newly observed
    /// block numbers, driving the Block Processor's `process_block_number`.
    async fn subscribe_new_blocks(&self) -> Result<tokio::sync::mpsc::UnboundedReceiver<u64>>;
}

/// Wraps a `Provider`, subtracting a fixed `delay` from every observed head,
/// refusing to report a height below the delay.
pub struct DelayProvider<P> {
    inner: P,
    delay: u64,
}

impl<P: Provider> DelayProvider<P> {
    pub fn new(inner: P, delay: u64) -> Self {
        DelayProvider { inner, delay }
    }
}

#[async_trait]
impl<P: Provider> Provider for DelayProvider<P> {
    async fn get_block_by_hash(&self, hash: H256) -> Result<Option<Block>> {
        self.inner.get_block_by_hash(hash).await
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        self.inner.get_block_by_number(number).await
    }

    async fn get_block_header_by_hash(&self, hash: H256) -> Result<Option<BlockHeader>> {
        self.inner.get_block_header_by_hash(hash).await
    }

    async fn get_transaction_receipt_block(&self, tx_hash: H256) -> Result<Option<H256>> {
        self.inner.get_transaction_receipt_block(tx_hash).await
    }

    async fn get_block_number(&self) -> Result<u64> {
        let number = self.inner.get_block_number().await?;
        number
            .checked_sub(self.delay)
            .ok_or_else(|| error::ErrorKind::BelowDelay(number, self.delay).into())
    }

    async fn get_logs(&self, block_hash: H256) -> Result<Vec<Log>> {
        self.inner.get_logs(block_hash).await
    }

    async fn get_transaction_count(&self, address: ethereum_types::Address) -> Result<U256> {
        self.inner.get_transaction_count(address).await
    }

    async fn estimate_gas(&self, to: ethereum_types::Address, data: &Bytes) -> Result<U256> {
        self.inner.estimate_gas(to, data).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        self.inner.send_raw_transaction(raw).await
    }

    async fn subscribe_new_blocks(&self) -> Result<tokio::sync::mpsc::UnboundedReceiver<u64>> {
        self.inner.subscribe_new_blocks().await
    }

    async fn get_balance(&self, address: ethereum_types::Address) -> Result<U256> {
        self.inner.get_balance(address).await
    }
}

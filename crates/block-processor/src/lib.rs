//! Block Processor: connects the Block Cache to the chain.
//!
//! Single-threaded-cooperative by design: every state transition here —
//! cache mutation, head promotion, listener dispatch — runs synchronously
//! under one lock; the only suspension points are the provider RPC calls
//! themselves. This is what makes "a new-head event N is delivered to all
//! reducers before processing of N+1 starts" true without anything
//! fancier than a mutex.

pub mod error;

pub use error::{Error, ErrorKind, Result};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethereum_types::H256;
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use pisa_provider::Provider;
use pisa_store::Store;
use pisa_types::{Block, BlockHeaderLike};

use block_cache::{AddResult, BlockCache, BlockItemStore};

const HEAD_NAMESPACE: &str = "block-processor";
const HEAD_KEY: &[u8] = b"head";

/// `Stopped → Starting → Running → Stopping → Stopped`. Listener
/// add/remove is only valid in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Delivered to every registered listener when the cache's head advances.
#[derive(Debug, Clone)]
pub struct NewHeadEvent {
    pub prev_head: Option<H256>,
    pub head: Block,
}

type Listener = Box<dyn Fn(&NewHeadEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedHead {
    head: u64,
}

/// Drives a [`BlockCache<Block>`] from a [`Provider`].
pub struct BlockProcessor<P: Provider> {
    provider: Arc<P>,
    store: Arc<dyn Store>,
    items: BlockItemStore,
    cache: Mutex<BlockCache<Block>>,
    state: Mutex<State>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    last_observed_hash: Mutex<Option<H256>>,
    max_depth: u64,
}

impl<P: Provider + 'static> BlockProcessor<P> {
    pub fn new(provider: Arc<P>, store: Arc<dyn Store>, max_depth: u64) -> Self {
        BlockProcessor {
            provider,
            items: BlockItemStore::new(store.clone()),
            store,
            cache: Mutex::new(BlockCache::new(max_depth)),
            state: Mutex::new(State::Stopped),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            last_observed_hash: Mutex::new(None),
            max_depth,
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn head_hash(&self) -> Option<H256> {
        self.cache.lock().head_hash()
    }

    /// A read-only view reducers may query ancestry against: the Block
    /// Cache is owned by the Block Processor, and reducers only ever get a
    /// read-only view of it. Callers must not hold this across an `await`.
    pub fn with_cache<R>(&self, f: impl FnOnce(&BlockCache<Block>) -> R) -> R {
        f(&self.cache.lock())
    }

    /// Reads the persisted head if present, else queries the provider,
    /// then processes that block number.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != State::Stopped {
                return Err(ErrorKind::AlreadyStarted.into());
            }
            *state = State::Starting;
        }

        for stub in self.items.restore_stubs()? {
            self.cache.lock().add_block(Block::stub(stub.hash, stub.number, stub.parent_hash));
        }

        let start_number = match self.store.get(HEAD_NAMESPACE, HEAD_KEY)? {
            Some(bytes) => {
                let persisted: PersistedHead = serde_json::from_slice(&bytes)
                    .map_err(|e| ErrorKind::BlockNotFound(e.to_string()))?;
                persisted.head
            }
            None => self.provider.get_block_number().await?,
        };

        *self.state.lock() = State::Running;
        self.process_block_number(start_number).await?;
        Ok(())
    }

    /// Listener add/remove is only valid in `Running`.
    pub fn add_listener(&self, listener: Listener) -> Result<ListenerId> {
        if self.state() != State::Running {
            return Err(ErrorKind::NotRunning.into());
        }
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<()> {
        if self.state() != State::Running {
            return Err(ErrorKind::NotRunning.into());
        }
        self.listeners.lock().retain(|(existing, _)| *existing != id);
        Ok(())
    }

    /// Removes the subscription and transitions to `Stopped`, letting any
    /// in-flight `process_block_number` complete — callers must simply
    /// stop invoking it; there is no cooperative cancellation here.
    pub fn stop(&self) {
        *self.state.lock() = State::Stopping;
        self.listeners.lock().clear();
        *self.state.lock() = State::Stopped;
    }

    /// The lockstep catch-up algorithm. Boxed because it tail-recurses
    /// through `.await` points when the cache is more than `max_depth`
    /// behind the observed chain.
    pub fn process_block_number<'a>(&'a self, n: u64) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cap = {
                let cache = self.cache.lock();
                match cache.head_hash().and_then(|h| cache.get_block(h).map(|b| b.number())) {
                    Some(head_number) => head_number + self.max_depth,
                    None => n,
                }
            };

            let (target, behind) = if n > cap { (cap, true) } else { (n, false) };

            let block = match self.fetch_by_number(target).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    info!(target: "block-processor", "no block at height {target}, will retry on next notification");
                    return Ok(());
                }
                Err(e) => return Err(self.classify(e)),
            };

            if self.cache.lock().has_block(block.header.hash) {
                debug!(target: "block-processor", "block {:?} already cached, skipping", block.header.hash);
                return Ok(());
            }

            *self.last_observed_hash.lock() = Some(block.header.hash);

            let mut current = block.clone();
            let mut add_result = self.add_block(current.clone())?;
            while matches!(add_result, AddResult::AddedDetached | AddResult::NotAddedAlreadyExistedDetached) {
                let parent_hash = current.header.parent_hash;
                let cached_parent = self.cache.lock().get_block(parent_hash).cloned();
                let parent = match cached_parent {
                    Some(parent) => parent,
                    None => match self.fetch_by_hash(parent_hash).await {
                        Ok(Some(parent)) => parent,
                        Ok(None) => {
                            info!(target: "block-processor", "parent {:?} unavailable, will retry on next notification", parent_hash);
                            return Ok(());
                        }
                        Err(e) => return Err(self.classify(e)),
                    },
                };
                add_result = self.add_block(parent.clone())?;
                current = parent;
            }

            let still_current = *self.last_observed_hash.lock() == Some(block.header.hash);
            let was_too_low = matches!(add_result, AddResult::NotAddedBlockNumberTooLow);

            if still_current && !was_too_low {
                self.promote_head(block).await?;
            }

            if behind {
                return self.process_block_number(n).await;
            }

            Ok(())
        })
    }

    async fn fetch_by_number(&self, number: u64) -> pisa_provider::Result<Option<Block>> {
        self.provider.get_block_by_number(number).await
    }

    async fn fetch_by_hash(&self, hash: H256) -> pisa_provider::Result<Option<Block>> {
        self.provider.get_block_by_hash(hash).await
    }

    fn classify(&self, e: pisa_provider::Error) -> Error {
        if e.kind().is_transient() {
            warn!(target: "block-processor", "transient provider error: {e}");
            // A transient error returned from inside the retry loop is
            // translated into "nothing changed"; callers see success and
            // retry naturally on the next notification.
            Error::from(ErrorKind::BlockNotFound(e.to_string()))
        } else {
            error!(target: "block-processor", "provider error: {e}");
            e.into()
        }
    }

    fn add_block(&self, block: Block) -> Result<AddResult> {
        let result = self.cache.lock().add_block(block.clone());
        if !matches!(result, AddResult::NotAddedBlockNumberTooLow) {
            self.items.put_stub(&block.header)?;
        }
        Ok(result)
    }

    /// Promotes `block` to head, persists the new head number, and
    /// dispatches the new-head event to every listener under the same lock
    /// that advanced the cache.
    async fn promote_head(&self, block: Block) -> Result<()> {
        let prev_head = self.cache.lock().head_hash();
        self.cache.lock().set_head(block.header.hash)?;

        let bytes = serde_json::to_vec(&PersistedHead { head: block.header.number })
            .expect("PersistedHead serializes");
        self.store.put(HEAD_NAMESPACE, HEAD_KEY, &bytes)?;

        let event = NewHeadEvent { prev_head, head: block };
        for (_, listener) in self.listeners.lock().iter() {
            listener(&event);
        }
        Ok(())
    }
}

//! The Block Cache itself: a reorg-aware, bounded-depth block DAG with a
//! single canonical head.
//!
//! Attachment is not tracked as a separate mutable set. Instead
//! [`BlockCache::is_attached`] walks parent pointers on demand: before the
//! first `set_head` every stored block is vacuously attached (there is no
//! floor yet to measure against), and afterwards a block is attached iff it
//! sits at `minimum_height + 1` with no stored parent (a "declared root")
//! or its parent is itself stored and attached.

use std::collections::{BTreeMap, HashMap, HashSet};

use ethereum_types::H256;
use log::{debug, warn};
use pisa_types::BlockHeaderLike;

use crate::error::{ErrorKind, Result};

/// Outcome of [`BlockCache::add_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Added,
    AddedDetached,
    NotAddedAlreadyExistedAttached,
    NotAddedAlreadyExistedDetached,
    NotAddedBlockNumberTooLow,
}

/// Extra bound for blocks that carry transactions, needed only by
/// [`BlockCache::get_confirmations`].
pub trait HasTransactionHashes {
    fn transaction_hashes(&self) -> Vec<H256>;
}

impl HasTransactionHashes for pisa_types::Block {
    fn transaction_hashes(&self) -> Vec<H256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}

/// Reorg-aware bounded-depth block DAG.
///
/// Generic over the stored block shape `B`: the Block Processor stores full
/// blocks, while components that only need ancestry can be driven by plain
/// [`pisa_types::BlockHeader`] stubs.
pub struct BlockCache<B: BlockHeaderLike + Clone> {
    blocks: HashMap<H256, B>,
    by_number: BTreeMap<u64, HashSet<H256>>,
    head_hash: Option<H256>,
    max_depth: u64,
    minimum_height: Option<u64>,
}

impl<B: BlockHeaderLike + Clone> BlockCache<B> {
    pub fn new(max_depth: u64) -> Self {
        BlockCache {
            blocks: HashMap::new(),
            by_number: BTreeMap::new(),
            head_hash: None,
            max_depth,
            minimum_height: None,
        }
    }

    pub fn head_hash(&self) -> Option<H256> {
        self.head_hash
    }

    pub fn minimum_height(&self) -> Option<u64> {
        self.minimum_height
    }

    pub fn has_block(&self, hash: H256) -> bool {
        self.blocks.contains_key(&hash)
    }

    pub fn get_block(&self, hash: H256) -> Option<&B> {
        self.blocks.get(&hash)
    }

    /// Whether `hash` is attached to the canonical graph. See module docs.
    pub fn is_attached(&self, hash: H256) -> bool {
        self.is_attached_inner(hash, &mut HashSet::new())
    }

    fn is_attached_inner(&self, hash: H256, seen: &mut HashSet<H256>) -> bool {
        let Some(block) = self.blocks.get(&hash) else {
            return false;
        };
        let Some(minimum_height) = self.minimum_height else {
            return true;
        };
        if block.number() <= minimum_height {
            return false;
        }
        if block.number() == minimum_height + 1 {
            return true;
        }
        if !seen.insert(hash) {
            // A cycle can't occur in honest chain data, but guards against
            // corrupt store contents looping forever.
            return false;
        }
        self.is_attached_inner(block.parent_hash(), seen)
    }

    /// Inserts `block`. Rejects blocks below the current pruning floor
    /// outright; otherwise records the block and reports whether it was
    /// newly inserted and whether it is attached.
    pub fn add_block(&mut self, block: B) -> AddResult {
        let hash = block.hash();
        let number = block.number();

        if let Some(minimum_height) = self.minimum_height {
            if number <= minimum_height {
                return AddResult::NotAddedBlockNumberTooLow;
            }
        }

        if self.blocks.contains_key(&hash) {
            return if self.is_attached(hash) {
                AddResult::NotAddedAlreadyExistedAttached
            } else {
                AddResult::NotAddedAlreadyExistedDetached
            };
        }

        self.by_number.entry(number).or_default().insert(hash);
        self.blocks.insert(hash, block);

        if self.is_attached(hash) {
            AddResult::Added
        } else {
            AddResult::AddedDetached
        }
    }

    /// Sets the canonical head, advances the pruning floor and drops
    /// everything at or below it. Fails if `hash` is unknown or detached.
    pub fn set_head(&mut self, hash: H256) -> Result<Vec<H256>> {
        if !self.blocks.contains_key(&hash) {
            return Err(ErrorKind::NotFound(hash).into());
        }
        if !self.is_attached(hash) {
            return Err(ErrorKind::NotAttached(hash).into());
        }

        self.head_hash = Some(hash);
        let head_number = self.blocks[&hash].number();
        let new_floor = head_number.saturating_sub(self.max_depth);
        self.minimum_height = Some(new_floor);

        let mut pruned = Vec::new();

        let below_floor: Vec<H256> = self
            .by_number
            .range(..=new_floor)
            .flat_map(|(_, hashes)| hashes.iter().copied())
            .collect();
        for hash in below_floor {
            self.remove(hash);
            pruned.push(hash);
        }

        // Anything still stored but now unreachable from the new floor is
        // pruned too, generalizing "prunes descendants of pruned blocks".
        loop {
            let orphaned: Vec<H256> = self
                .blocks
                .keys()
                .copied()
                .filter(|h| !self.is_attached(*h))
                .collect();
            if orphaned.is_empty() {
                break;
            }
            for hash in orphaned {
                self.remove(hash);
                pruned.push(hash);
            }
        }

        debug!(target: "block-cache", "set_head({:?}) pruned {} blocks, floor now {}", hash, pruned.len(), new_floor);
        Ok(pruned)
    }

    fn remove(&mut self, hash: H256) {
        if let Some(block) = self.blocks.remove(&hash) {
            if let Some(set) = self.by_number.get_mut(&block.number()) {
                set.remove(&hash);
                if set.is_empty() {
                    self.by_number.remove(&block.number());
                }
            }
        }
    }

    /// Ancestors of `hash`, starting with `hash` itself, walking toward the
    /// genesis until a parent is not stored.
    pub fn ancestry(&self, hash: H256) -> impl Iterator<Item = &B> {
        Ancestry {
            cache: self,
            next: Some(hash),
        }
    }

    /// The first ancestor of `hash` (inclusive) at or below `min_height`
    /// matching `predicate`, an ancestry-search helper used by
    /// anchor-state reducers to detect confirmation depth.
    pub fn find_ancestor<F>(&self, hash: H256, min_height: u64, mut predicate: F) -> Option<&B>
    where
        F: FnMut(&B) -> bool,
    {
        for block in self.ancestry(hash) {
            if predicate(block) {
                return Some(block);
            }
            if block.number() <= min_height {
                break;
            }
        }
        None
    }
}

impl<B: BlockHeaderLike + Clone + HasTransactionHashes> BlockCache<B> {
    /// Number of confirmations `tx_hash` has relative to `head_hash`: the
    /// 1-indexed distance from the head to the block containing the
    /// transaction, or `0` if it is not found in the stored ancestry.
    /// Consumed by the Confirmation Observer.
    pub fn get_confirmations(&self, head_hash: H256, tx_hash: H256) -> u64 {
        for (depth, block) in self.ancestry(head_hash).enumerate() {
            if block.transaction_hashes().contains(&tx_hash) {
                return depth as u64 + 1;
            }
        }
        warn!(target: "block-cache", "transaction {:?} not found in ancestry of {:?}", tx_hash, head_hash);
        0
    }
}

struct Ancestry<'a, B: BlockHeaderLike + Clone> {
    cache: &'a BlockCache<B>,
    next: Option<H256>,
}

impl<'a, B: BlockHeaderLike + Clone> Iterator for Ancestry<'a, B> {
    type Item = &'a B;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        let block = self.cache.blocks.get(&hash)?;
        self.next = Some(block.parent_hash());
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pisa_types::BlockHeader;

    fn header(n: u64, hash: u64, parent: u64) -> BlockHeader {
        BlockHeader {
            hash: H256::from_low_u64_be(hash),
            number: n,
            parent_hash: H256::from_low_u64_be(parent),
        }
    }

    #[test]
    fn genesis_add_is_attached_before_any_set_head() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
        let genesis = header(0, 1, 0);
        assert_eq!(cache.add_block(genesis), AddResult::Added);
    }

    #[test]
    fn detached_block_reports_added_detached() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
        cache.add_block(header(0, 1, 0));
        cache.set_head(H256::from_low_u64_be(1)).unwrap();
        // Orphan block whose parent was never seen.
        let orphan = header(5, 99, 98);
        assert_eq!(cache.add_block(orphan), AddResult::AddedDetached);
    }

    #[test]
    fn re_adding_existing_attached_block_is_reported() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
        let genesis = header(0, 1, 0);
        cache.add_block(genesis);
        assert_eq!(
            cache.add_block(genesis),
            AddResult::NotAddedAlreadyExistedAttached
        );
    }

    #[test]
    fn too_low_block_number_rejected_after_floor_advances() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(2);
        cache.add_block(header(0, 1, 0));
        cache.add_block(header(1, 2, 1));
        cache.add_block(header(2, 3, 2));
        cache.set_head(H256::from_low_u64_be(3)).unwrap();
        // floor = 2 - 2 = 0
        assert_eq!(
            cache.add_block(header(0, 1, 0)),
            AddResult::NotAddedAlreadyExistedAttached
        );
        let stale = header(0, 100, 0);
        assert_eq!(cache.add_block(stale), AddResult::NotAddedBlockNumberTooLow);
    }

    #[test]
    fn set_head_prunes_below_depth_and_declares_new_root() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(2);
        cache.add_block(header(0, 1, 0));
        cache.add_block(header(1, 2, 1));
        cache.add_block(header(2, 3, 2));
        let pruned = cache.set_head(H256::from_low_u64_be(3)).unwrap();
        // max_depth = 2, head number = 2, floor = 0: only block 1 (number 0) pruned.
        assert_eq!(pruned, vec![H256::from_low_u64_be(1)]);
        assert!(!cache.has_block(H256::from_low_u64_be(1)));
        // Block 2 (number 1) is now a declared root: parent not stored.
        assert!(cache.is_attached(H256::from_low_u64_be(2)));
    }

    #[test]
    fn set_head_rejects_unknown_or_detached_target() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
        assert!(cache.set_head(H256::from_low_u64_be(42)).is_err());
        cache.add_block(header(0, 1, 0));
        cache.set_head(H256::from_low_u64_be(1)).unwrap();
        let orphan = header(5, 99, 98);
        cache.add_block(orphan);
        assert!(cache.set_head(H256::from_low_u64_be(99)).is_err());
    }

    #[test]
    fn ancestry_walks_to_declared_root() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(10);
        cache.add_block(header(0, 1, 0));
        cache.add_block(header(1, 2, 1));
        cache.add_block(header(2, 3, 2));
        let chain: Vec<H256> = cache
            .ancestry(H256::from_low_u64_be(3))
            .map(|b| b.hash)
            .collect();
        assert_eq!(
            chain,
            vec![
                H256::from_low_u64_be(3),
                H256::from_low_u64_be(2),
                H256::from_low_u64_be(1)
            ]
        );
    }

    #[test]
    fn reorg_orphans_sibling_branch() {
        let mut cache: BlockCache<BlockHeader> = BlockCache::new(1);
        cache.add_block(header(0, 1, 0));
        cache.add_block(header(1, 2, 1));
        cache.add_block(header(1, 3, 1)); // sibling fork at the same height
        let first_pruned = cache.set_head(H256::from_low_u64_be(2)).unwrap();
        // floor = 1 - 1 = 0: genesis drops out, both height-1 blocks survive
        // as declared roots.
        assert_eq!(first_pruned, vec![H256::from_low_u64_be(1)]);
        assert!(cache.is_attached(H256::from_low_u64_be(3)));

        // Advance further so both height-1 blocks fall below the new floor.
        cache.add_block(header(2, 4, 2));
        let second_pruned = cache.set_head(H256::from_low_u64_be(4)).unwrap();
        assert!(second_pruned.contains(&H256::from_low_u64_be(2)));
        assert!(second_pruned.contains(&H256::from_low_u64_be(3)));
    }
}

//! Gas Queue: the ordered, nonce-contiguous list of in-flight response
//! transactions sharing one signing address.
//!
//! The queue is a persistent value — every operation returns a new queue
//! (or an error leaving the caller's queue untouched) rather than mutating
//! in place, the same functional-update style used for anything whose
//! invariants are load-bearing. This makes "queue contiguity at all
//! observable times" a property of the type rather than something
//! enforced by convention across call sites.

pub mod error;

pub use error::{Error, ErrorKind, Result};

use std::sync::Arc;

use ethereum_types::U256;
use pisa_types::PisaTransactionIdentifier;

/// A request to submit or re-submit a specific response transaction,
/// opaque to the queue beyond the appointment id it carries for
/// logging/bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueueRequest {
    pub appointment_id: ethereum_types::H256,
    pub deadline_block: u64,
}

/// `{ identifier, request, nonce, gas_price }`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueueItem {
    pub identifier: PisaTransactionIdentifier,
    pub request: QueueRequest,
    pub nonce: u64,
    pub gas_price: U256,
}

/// Nonce-ordered, identifier-unique, persistent queue.
///
/// Items are always sorted strictly ascending by `nonce`, contiguous from
/// `base_nonce`. `Arc<[QueueItem]>` keeps `clone` (needed to hand the
/// Multi-Responder both the old and new queue for `difference`) cheap.
#[derive(Debug, Clone)]
pub struct GasQueue {
    base_nonce: u64,
    items: Arc<Vec<QueueItem>>,
}

impl GasQueue {
    pub fn new(base_nonce: u64) -> Self {
        GasQueue {
            base_nonce,
            items: Arc::new(Vec::new()),
        }
    }

    /// Rebuilds a queue from its raw parts, as persisted by the
    /// responder's journal. Does not validate invariants —
    /// callers restoring from a trusted journal may follow up with
    /// [`GasQueue::check_invariants`].
    pub fn from_parts(base_nonce: u64, items: Vec<QueueItem>) -> Self {
        GasQueue {
            base_nonce,
            items: Arc::new(items),
        }
    }

    pub fn base_nonce(&self) -> u64 {
        self.base_nonce
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn get(&self, identifier: &PisaTransactionIdentifier) -> Option<&QueueItem> {
        self.items.iter().find(|item| &item.identifier == identifier)
    }

    pub fn get_by_nonce(&self, nonce: u64) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.nonce == nonce)
    }

    /// Appends a new item at `base_nonce + len`. Rejects a duplicate
    /// identifier outright, leaving `self` untouched.
    pub fn add(&self, request: QueueRequest, identifier: PisaTransactionIdentifier, current_gas_price: U256, floor: U256) -> Result<GasQueue> {
        if self.get(&identifier).is_some() {
            return Err(ErrorKind::Duplicate(format!("{identifier:?}")).into());
        }

        let nonce = self.base_nonce + self.items.len() as u64;
        let gas_price = current_gas_price.max(floor);

        let mut items = (*self.items).clone();
        items.push(QueueItem {
            identifier,
            request,
            nonce,
            gas_price,
        });

        Ok(GasQueue {
            base_nonce: self.base_nonce,
            items: Arc::new(items),
        })
    }

    /// Confirms the item at `nonce` is mined: drops every item at or below
    /// it and advances `base_nonce` past it. Rejects a nonce below
    /// the current `base_nonce` as non-contiguous.
    pub fn consume(&self, nonce: u64) -> Result<GasQueue> {
        if nonce < self.base_nonce {
            return Err(ErrorKind::NonContiguousConsume(nonce, self.base_nonce).into());
        }

        let items: Vec<QueueItem> = self
            .items
            .iter()
            .filter(|item| item.nonce > nonce)
            .cloned()
            .collect();

        Ok(GasQueue {
            base_nonce: nonce + 1,
            items: Arc::new(items),
        })
    }

    /// Raises the gas price of a specific queued item; its nonce and
    /// position are unchanged.
    pub fn bump(&self, identifier: &PisaTransactionIdentifier, new_gas_price: U256) -> Result<GasQueue> {
        if self.get(identifier).is_none() {
            return Err(ErrorKind::UnknownIdentifier(format!("{identifier:?}")).into());
        }

        let items: Vec<QueueItem> = self
            .items
            .iter()
            .map(|item| {
                if &item.identifier == identifier {
                    QueueItem {
                        gas_price: new_gas_price,
                        ..item.clone()
                    }
                } else {
                    item.clone()
                }
            })
            .collect();

        Ok(GasQueue {
            base_nonce: self.base_nonce,
            items: Arc::new(items),
        })
    }

    /// Replaces the prefix of owned nonces with `queue_items`, used when
    /// the responder discovers the chain holds a different transaction at
    /// an owned nonce — an external replacement or a reorg. Items past
    /// the replaced range are kept as-is.
    pub fn replace_from(&self, queue_items: Vec<QueueItem>) -> GasQueue {
        let replaced_nonces: std::collections::HashSet<u64> =
            queue_items.iter().map(|item| item.nonce).collect();

        let mut items = queue_items;
        items.extend(
            self.items
                .iter()
                .filter(|item| !replaced_nonces.contains(&item.nonce))
                .cloned(),
        );
        items.sort_by_key(|item| item.nonce);

        GasQueue {
            base_nonce: self.base_nonce,
            items: Arc::new(items),
        }
    }

    /// Items present in `self` but absent (by identifier) from `older`,
    /// order preserved — what the Multi-Responder must (re)broadcast after
    /// a mutation.
    pub fn difference(&self, older: &GasQueue) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|item| older.get(&item.identifier) != Some(item))
            .cloned()
            .collect()
    }

    /// True iff nonces are strictly ascending and contiguous from
    /// `base_nonce` and no identifier repeats. Exposed for property
    /// tests; every mutator above already upholds
    /// this by construction.
    pub fn check_invariants(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut expected = self.base_nonce;
        for item in self.items.iter() {
            if item.nonce != expected {
                return false;
            }
            if !seen.insert(&item.identifier) {
                return false;
            }
            expected += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{Address, H256};

    fn identifier(tag: u64) -> PisaTransactionIdentifier {
        PisaTransactionIdentifier {
            chain_id: 1,
            to: Address::from_low_u64_be(tag),
            data: parity_bytes::Bytes::new(),
            value: U256::zero(),
            gas_limit: U256::from(21_000),
        }
    }

    fn request(tag: u64) -> QueueRequest {
        QueueRequest {
            appointment_id: H256::from_low_u64_be(tag),
            deadline_block: 100,
        }
    }

    #[test]
    fn add_assigns_contiguous_nonces() {
        let q = GasQueue::new(5);
        let q = q.add(request(1), identifier(1), U256::from(10), U256::zero()).unwrap();
        let q = q.add(request(2), identifier(2), U256::from(10), U256::zero()).unwrap();
        assert_eq!(q.get(&identifier(1)).unwrap().nonce, 5);
        assert_eq!(q.get(&identifier(2)).unwrap().nonce, 6);
        assert!(q.check_invariants());
    }

    #[test]
    fn add_respects_gas_price_floor() {
        let q = GasQueue::new(0);
        let q = q.add(request(1), identifier(1), U256::from(3), U256::from(10)).unwrap();
        assert_eq!(q.get(&identifier(1)).unwrap().gas_price, U256::from(10));
    }

    #[test]
    fn add_duplicate_identifier_fails_and_leaves_queue_untouched() {
        let q = GasQueue::new(0).add(request(1), identifier(1), U256::from(1), U256::zero()).unwrap();
        let err = q.add(request(1), identifier(1), U256::from(1), U256::zero());
        assert!(err.is_err());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn consume_drops_confirmed_and_advances_base_nonce() {
        let q = GasQueue::new(5);
        let q = q.add(request(1), identifier(1), U256::from(1), U256::zero()).unwrap();
        let q = q.add(request(2), identifier(2), U256::from(1), U256::zero()).unwrap();
        let q = q.add(request(3), identifier(3), U256::from(1), U256::zero()).unwrap();
        let q = q.consume(6).unwrap();
        assert_eq!(q.base_nonce(), 7);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(&identifier(3)).unwrap().nonce, 7);
        assert!(q.check_invariants());
    }

    #[test]
    fn consume_below_base_nonce_is_rejected() {
        let q = GasQueue::new(5);
        assert!(q.consume(3).is_err());
    }

    #[test]
    fn bump_preserves_nonce_and_only_touches_target() {
        let q = GasQueue::new(5);
        let q = q.add(request(1), identifier(1), U256::from(10), U256::zero()).unwrap();
        let prev = q.clone();
        let bumped = q.bump(&identifier(1), U256::from(12)).unwrap();
        assert_eq!(bumped.get(&identifier(1)).unwrap().nonce, 5);
        assert_eq!(bumped.get(&identifier(1)).unwrap().gas_price, U256::from(12));
        let diff = bumped.difference(&prev);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].gas_price, U256::from(12));
    }

    #[test]
    fn bump_unknown_identifier_fails() {
        let q = GasQueue::new(0);
        assert!(q.bump(&identifier(9), U256::from(1)).is_err());
    }

    #[test]
    fn difference_reports_new_and_changed_items_in_order() {
        let base = GasQueue::new(0);
        let one = base.add(request(1), identifier(1), U256::from(1), U256::zero()).unwrap();
        let two = one.add(request(2), identifier(2), U256::from(1), U256::zero()).unwrap();
        let diff = two.difference(&base);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].identifier, identifier(1));
        assert_eq!(diff[1].identifier, identifier(2));
        // Unmutated from `one` to `two`, item 1 doesn't reappear against `one`.
        assert_eq!(two.difference(&one).len(), 1);
    }

    #[test]
    fn replace_from_swaps_owned_nonce_range_and_keeps_tail() {
        let q = GasQueue::new(5);
        let q = q.add(request(1), identifier(1), U256::from(1), U256::zero()).unwrap();
        let q = q.add(request(2), identifier(2), U256::from(1), U256::zero()).unwrap();
        let replacement = QueueItem {
            identifier: identifier(3),
            request: request(3),
            nonce: 5,
            gas_price: U256::from(99),
        };
        let replaced = q.replace_from(vec![replacement.clone()]);
        assert_eq!(replaced.get_by_nonce(5).unwrap().identifier, identifier(3));
        assert_eq!(replaced.get_by_nonce(6).unwrap().identifier, identifier(2));
        assert!(replaced.check_invariants());
    }

    #[test]
    fn empty_queue_has_no_items_and_upholds_invariants() {
        let q = GasQueue::new(42);
        assert!(q.is_empty());
        assert!(q.check_invariants());
    }
}

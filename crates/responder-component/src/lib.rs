//! Responder Component: the per-appointment anchor-state reducer that
//! detects "my transaction should be submitted / bumped / considered
//! mined / confirmed" and emits actions for the Multi-Responder.
//!
//! Unlike the toy single-counter reducer in `reducer-framework`'s tests,
//! this reducer tracks a *set* of appointments whose membership can grow
//! at runtime (new appointments arrive continuously). The
//! [`reducer_framework::Reducer`] trait only ever hands `initial`/`reduce`
//! a single block, so membership itself lives on `ResponderComponent` as
//! shared, ambient state (`appointments`) rather than inside `State` —
//! `register_appointment` seeds a new entry's starting point once, up
//! front, by walking ancestry directly against the Block Cache; from then
//! on `reduce` advances it one block at a time.

use std::collections::BTreeMap;

use ethereum_types::{Address, H256};
use parking_lot::RwLock;
use pisa_types::{Block, BlockHeaderLike, PisaTransactionIdentifier};

use block_cache::BlockCache;
use reducer_framework::Reducer;

/// Per-appointment anchor state. `block_mined` is the block *number*
/// (not hash) the matching transaction was observed in, used in the
/// confirmation formula `next.block_number - block_mined`. `Pending`
/// never reverses back from `Mined` inside `reduce` — a reorg below the
/// mined block instead recomputes `state_at` for the new branch from
/// scratch, which naturally re-derives `Pending` if the transaction
/// really did disappear.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PerAppointmentState {
    Pending {
        identifier: PisaTransactionIdentifier,
        appointment_id: H256,
    },
    Mined {
        identifier: PisaTransactionIdentifier,
        appointment_id: H256,
        block_mined: u64,
        nonce: u64,
    },
}

/// `{ block_number, items: map<appointmentId -> per-appointment state> }`.
/// `BTreeMap` keeps iteration in `appointmentId` order, which is exactly
/// the stable order `detect_changes`'s tie-break requires.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResponderAggregateState {
    pub block_number: u64,
    pub items: BTreeMap<H256, PerAppointmentState>,
}

/// What was already known about a mined transaction when an appointment
/// was registered, found by a one-time ancestry scan performed eagerly at
/// registration rather than lazily inside `Reducer::initial` — see the
/// module docs for why.
#[derive(Debug, Clone)]
struct MinedHint {
    block_mined: u64,
    nonce: u64,
}

#[derive(Debug, Clone)]
struct TrackedAppointment {
    identifier: PisaTransactionIdentifier,
    confirmations_required: u32,
    known_mined: Option<MinedHint>,
}

/// Action emitted by [`ResponderComponent::detect_changes`] for the
/// Multi-Responder's action bus to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderAction {
    ReEnqueueMissingItems(Vec<H256>),
    TxMined {
        identifier: PisaTransactionIdentifier,
        appointment_id: H256,
        nonce: u64,
    },
    CheckResponderBalance,
    EndResponse { appointment_id: H256 },
}

/// The Responder Component itself: owns the tracked-appointment set and
/// implements [`Reducer`] over it.
pub struct ResponderComponent {
    signing_address: Address,
    max_depth: u64,
    appointments: RwLock<BTreeMap<H256, TrackedAppointment>>,
}

impl ResponderComponent {
    pub fn new(signing_address: Address, max_depth: u64) -> Self {
        ResponderComponent {
            signing_address,
            max_depth,
            appointments: RwLock::new(BTreeMap::new()),
        }
    }

    /// Begins tracking `appointment_id`, scanning ancestry from `head`
    /// back to `max(head.number - max_depth, block_observed)` for an
    /// already-mined match.
    pub fn register_appointment(
        &self,
        cache: &BlockCache<Block>,
        head: H256,
        appointment_id: H256,
        identifier: PisaTransactionIdentifier,
        confirmations_required: u32,
        block_observed: u64,
    ) {
        let min_height = cache
            .get_block(head)
            .map(|b| b.number().saturating_sub(self.max_depth).max(block_observed))
            .unwrap_or(block_observed);

        let found = cache.find_ancestor(head, min_height, |block| {
            find_match(block, &identifier, self.signing_address).is_some()
        });

        let known_mined = found.and_then(|block| {
            find_match(block, &identifier, self.signing_address).map(|tx| MinedHint {
                block_mined: block.number(),
                nonce: tx.nonce.as_u64(),
            })
        });

        self.appointments.write().insert(
            appointment_id,
            TrackedAppointment {
                identifier,
                confirmations_required,
                known_mined,
            },
        );
    }

    /// Stops tracking `appointment_id`, once the final confirmation has
    /// been reached and `EndResponse` has fired.
    pub fn forget_appointment(&self, appointment_id: H256) {
        self.appointments.write().remove(&appointment_id);
    }

    pub fn is_tracked(&self, appointment_id: H256) -> bool {
        self.appointments.read().contains_key(&appointment_id)
    }

    fn seed_state(id: H256, tracked: &TrackedAppointment) -> PerAppointmentState {
        match &tracked.known_mined {
            Some(hint) => PerAppointmentState::Mined {
                identifier: tracked.identifier.clone(),
                appointment_id: id,
                block_mined: hint.block_mined,
                nonce: hint.nonce,
            },
            None => PerAppointmentState::Pending {
                identifier: tracked.identifier.clone(),
                appointment_id: id,
            },
        }
    }

    fn fold(&self, prev: Option<&ResponderAggregateState>, block: &Block) -> ResponderAggregateState {
        let appointments = self.appointments.read();
        let mut items = BTreeMap::new();

        for (id, tracked) in appointments.iter() {
            let prev_item = prev.and_then(|p| p.items.get(id));
            let next_item = match prev_item {
                None => Self::seed_state(*id, tracked),
                Some(mined @ PerAppointmentState::Mined { .. }) => mined.clone(),
                Some(PerAppointmentState::Pending { .. }) => {
                    match find_match(block, &tracked.identifier, self.signing_address) {
                        Some(tx) => PerAppointmentState::Mined {
                            identifier: tracked.identifier.clone(),
                            appointment_id: *id,
                            block_mined: block.number(),
                            nonce: tx.nonce.as_u64(),
                        },
                        None => prev_item.unwrap().clone(),
                    }
                }
            };
            items.insert(*id, next_item);
        }

        ResponderAggregateState {
            block_number: block.number(),
            items,
        }
    }

    /// Pure diff: compares two aggregate states and emits the
    /// actions the Multi-Responder must apply, in stable appointmentId
    /// order with `TxMined` preceding `EndResponse` within an appointment.
    /// Needs `&self` (unlike a free function) because `confirmations_required`
    /// lives on the tracked appointment, not in the chain-derived state.
    pub fn detect_changes(
        &self,
        prev: &ResponderAggregateState,
        next: &ResponderAggregateState,
    ) -> Vec<ResponderAction> {
        let appointments = self.appointments.read();
        let mut re_enqueue = Vec::new();
        let mut per_appointment = Vec::new();

        for (id, next_item) in next.items.iter() {
            let prev_item = prev.items.get(id);
            let mut actions_here = Vec::new();

            match (prev_item, next_item) {
                (None | Some(PerAppointmentState::Pending { .. }), PerAppointmentState::Pending { .. }) => {
                    re_enqueue.push(*id);
                }
                (
                    None | Some(PerAppointmentState::Pending { .. }),
                    PerAppointmentState::Mined { identifier, nonce, .. },
                ) => {
                    actions_here.push(ResponderAction::TxMined {
                        identifier: identifier.clone(),
                        appointment_id: *id,
                        nonce: *nonce,
                    });
                    actions_here.push(ResponderAction::CheckResponderBalance);
                }
                _ => {}
            }

            if let PerAppointmentState::Mined { block_mined, .. } = next_item {
                if let Some(tracked) = appointments.get(id) {
                    if next.block_number.saturating_sub(*block_mined) >= tracked.confirmations_required as u64 {
                        actions_here.push(ResponderAction::EndResponse { appointment_id: *id });
                    }
                }
            }

            if !actions_here.is_empty() {
                per_appointment.push((*id, actions_here));
            }
        }

        let mut actions = Vec::new();
        if !re_enqueue.is_empty() {
            actions.push(ResponderAction::ReEnqueueMissingItems(re_enqueue));
        }
        for (_, mut group) in per_appointment {
            actions.append(&mut group);
        }
        actions
    }
}

fn find_match<'a>(
    block: &'a Block,
    identifier: &PisaTransactionIdentifier,
    signing_address: Address,
) -> Option<&'a pisa_types::Transaction> {
    block
        .transactions
        .iter()
        .find(|tx| tx.from == signing_address && tx.identifier().as_ref() == Some(identifier))
}

impl Reducer for ResponderComponent {
    type State = ResponderAggregateState;
    type Block = Block;

    fn name(&self) -> &'static str {
        "responder"
    }

    fn initial(&self, block: &Self::Block) -> Self::State {
        self.fold(None, block)
    }

    fn reduce(&self, prev: &Self::State, block: &Self::Block) -> Self::State {
        self.fold(Some(prev), block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pisa_types::{BlockHeader, Transaction};

    fn identifier(tag: u64) -> PisaTransactionIdentifier {
        PisaTransactionIdentifier {
            chain_id: 1,
            to: Address::from_low_u64_be(tag),
            data: parity_bytes_for_test(),
            value: ethereum_types::U256::zero(),
            gas_limit: ethereum_types::U256::from(21_000),
        }
    }

    fn parity_bytes_for_test() -> parity_bytes::Bytes {
        parity_bytes::Bytes::new()
    }

    fn from_addr() -> Address {
        Address::from_low_u64_be(0xf1)
    }

    fn other_addr() -> Address {
        Address::from_low_u64_be(0xf2)
    }

    fn block_with_tx(n: u64, hash: u64, parent: u64, tx: Option<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                hash: H256::from_low_u64_be(hash),
                number: n,
                parent_hash: H256::from_low_u64_be(parent),
            },
            transactions: tx.into_iter().collect(),
            logs: Vec::new(),
        }
    }

    fn mined_tx(identifier: PisaTransactionIdentifier, from: Address, nonce: u64, block_number: u64) -> Transaction {
        Transaction {
            hash: H256::from_low_u64_be(nonce + 1000),
            from,
            to: Some(identifier.to),
            nonce: ethereum_types::U256::from(nonce),
            chain_id: identifier.chain_id,
            data: identifier.data.clone(),
            value: identifier.value,
            gas_limit: identifier.gas_limit,
            block_number,
        }
    }

    fn cache_with_blocks(blocks: Vec<Block>) -> BlockCache<Block> {
        let mut cache = BlockCache::new(100);
        for b in blocks {
            cache.add_block(b);
        }
        cache
    }

    #[test]
    fn pending_to_mined_then_confirmed() {
        let component = ResponderComponent::new(from_addr(), 100);
        let id1 = H256::from_low_u64_be(1);

        let genesis = block_with_tx(0, 1, 0, None);
        let b1 = block_with_tx(1, 2, 1, None);
        let b2 = block_with_tx(2, 3, 2, None);
        let b3 = block_with_tx(3, 4, 3, Some(mined_tx(identifier(1), from_addr(), 1, 3)));
        let cache = cache_with_blocks(vec![genesis.clone(), b1.clone(), b2.clone(), b3.clone()]);

        component.register_appointment(&cache, H256::from_low_u64_be(1), id1, identifier(1), 5, 0);

        let s0 = component.initial(&genesis);
        let s1 = component.reduce(&s0, &b1);
        let s2 = component.reduce(&s1, &b2);
        let s3 = component.reduce(&s2, &b3);

        let actions = component.detect_changes(&s2, &s3);
        assert_eq!(
            actions,
            vec![
                ResponderAction::TxMined { identifier: identifier(1), appointment_id: id1, nonce: 1 },
                ResponderAction::CheckResponderBalance,
            ]
        );

        // 5 more blocks without further transactions: head block_number 8,
        // block_mined 3, 8 - 3 = 5 >= confirmations_required(5).
        let mut s = s3.clone();
        let mut prev_block = b3.clone();
        for n in 4..=8u64 {
            let next_block = block_with_tx(n, n + 1, n, None);
            s = component.reduce(&s, &next_block);
            prev_block = next_block;
        }
        let _ = prev_block;
        let final_actions = component.detect_changes(&s3, &s);
        assert!(final_actions.contains(&ResponderAction::EndResponse { appointment_id: id1 }));
    }

    #[test]
    fn re_enqueue_emitted_on_first_observation_and_on_every_still_pending_head() {
        let component = ResponderComponent::new(from_addr(), 100);
        let id1 = H256::from_low_u64_be(1);
        let genesis = block_with_tx(10, 11, 10, None);
        let cache = cache_with_blocks(vec![genesis.clone()]);
        component.register_appointment(&cache, H256::from_low_u64_be(11), id1, identifier(1), 5, 0);

        let empty = ResponderAggregateState { block_number: 10, items: BTreeMap::new() };
        let seeded = component.initial(&genesis);
        let actions = component.detect_changes(&empty, &seeded);
        // First observation of a pending appointment must still be
        // (re)enqueued: nothing has broadcast it yet.
        assert_eq!(actions, vec![ResponderAction::ReEnqueueMissingItems(vec![id1])]);

        // A second head with no new transaction: still Pending, re-enqueued again.
        let b11 = block_with_tx(11, 12, 11, None);
        let next = component.reduce(&seeded, &b11);
        let actions = component.detect_changes(&seeded, &next);
        assert_eq!(actions, vec![ResponderAction::ReEnqueueMissingItems(vec![id1])]);
    }

    #[test]
    fn wrong_from_address_keeps_state_pending() {
        let component = ResponderComponent::new(from_addr(), 100);
        let id1 = H256::from_low_u64_be(1);
        let genesis = block_with_tx(0, 1, 0, None);
        let cache = cache_with_blocks(vec![genesis.clone()]);
        component.register_appointment(&cache, H256::from_low_u64_be(1), id1, identifier(1), 5, 0);

        let s0 = component.initial(&genesis);
        let foreign_tx_block = block_with_tx(1, 2, 1, Some(mined_tx(identifier(1), other_addr(), 1, 1)));
        let s1 = component.reduce(&s0, &foreign_tx_block);

        assert!(matches!(s1.items.get(&id1), Some(PerAppointmentState::Pending { .. })));
        // Still Pending, so it is re-enqueued again — the foreign-address tx
        // simply didn't match, it didn't stop tracking.
        assert_eq!(
            component.detect_changes(&s0, &s1),
            vec![ResponderAction::ReEnqueueMissingItems(vec![id1])]
        );
    }

    #[test]
    fn registration_scans_ancestry_for_already_mined_transaction() {
        let component = ResponderComponent::new(from_addr(), 100);
        let id1 = H256::from_low_u64_be(1);
        let genesis = block_with_tx(0, 1, 0, None);
        let mined_block = block_with_tx(2, 3, 2, Some(mined_tx(identifier(1), from_addr(), 7, 2)));
        let b1 = block_with_tx(1, 2, 1, None);
        let cache = cache_with_blocks(vec![genesis, b1, mined_block]);

        component.register_appointment(&cache, H256::from_low_u64_be(3), id1, identifier(1), 5, 0);
        let seeded_state = component.initial(&block_with_tx(2, 3, 2, None));
        match seeded_state.items.get(&id1).unwrap() {
            PerAppointmentState::Mined { block_mined, nonce, .. } => {
                assert_eq!(*block_mined, 2);
                assert_eq!(*nonce, 7);
            }
            other => panic!("expected Mined, got {other:?}"),
        }
    }
}

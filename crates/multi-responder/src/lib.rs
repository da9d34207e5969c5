//! Multi-Responder: the single writer for one signing address. Translates
//! Responder Component actions into Gas Queue operations, broadcasts the
//! difference, and tracks mined nonces.

pub mod error;
pub mod journal;
pub mod signer;

pub use error::{Error, ErrorKind, Result};
pub use signer::{FakeSigner, Signer, UnsignedTransaction};

use std::collections::HashSet;
use std::sync::Arc;

use ethereum_types::{H256, U256};
use log::{error, info, warn};
use parking_lot::Mutex;
use pisa_provider::Provider;
use pisa_store::Store;

use gas_queue::{GasQueue, QueueItem, QueueRequest};
use pisa_types::PisaTransactionIdentifier;
use responder_component::ResponderAction;

use journal::ResponderJournal;

/// Resolves an appointment id to the request/identifier the Multi-
/// Responder needs in order to (re)enqueue it — the data the Responder
/// Component itself does not carry. `ReEnqueueMissingItems` is driven by
/// the entries the component knows about, looked up here.
pub trait AppointmentResolver: Send + Sync {
    fn resolve(&self, appointment_id: H256) -> Option<(PisaTransactionIdentifier, QueueRequest)>;
}

/// Gas-bumping policy. The precise gas-bump schedule and cap are left as
/// a configurable policy rather than a fixed constant. `factor_ppm`
/// multiplies the current gas price
/// by `factor_ppm / 1_000_000` on every block a pending item stays
/// unmined; `max_gas_price` is the hard cap past which an item is marked
/// stuck rather than bumped further.
#[derive(Debug, Clone, Copy)]
pub struct GasBumpPolicy {
    pub factor_ppm: u64,
    pub max_gas_price: U256,
    pub floor: U256,
}

impl GasBumpPolicy {
    pub fn bumped(&self, current: U256) -> U256 {
        let bumped = current.saturating_mul(U256::from(self.factor_ppm)) / U256::from(1_000_000u64);
        bumped.max(current + U256::one()).min(self.max_gas_price)
    }
}

pub struct MultiResponder<P: Provider> {
    provider: Arc<P>,
    signer: Arc<dyn Signer>,
    queue: Mutex<GasQueue>,
    journal: ResponderJournal,
    policy: GasBumpPolicy,
    stuck: Mutex<HashSet<PisaTransactionIdentifier>>,
    ended: Mutex<HashSet<H256>>,
    last_broadcast_error: Mutex<Option<String>>,
    chain_id: u64,
}

impl<P: Provider> MultiResponder<P> {
    pub fn new(
        provider: Arc<P>,
        signer: Arc<dyn Signer>,
        store: Arc<dyn Store>,
        chain_id: u64,
        policy: GasBumpPolicy,
    ) -> Self {
        MultiResponder {
            provider,
            signer,
            queue: Mutex::new(GasQueue::new(0)),
            journal: ResponderJournal::new(store, 200),
            policy,
            stuck: Mutex::new(HashSet::new()),
            ended: Mutex::new(HashSet::new()),
            last_broadcast_error: Mutex::new(None),
            chain_id,
        }
    }

    /// Nonce-management protocol: `pending_nonce` starts from the remote
    /// transaction count, with the journal replayed on top so a restart
    /// reconstructs the queue before the reducer framework replays the
    /// latest head.
    pub async fn start(&self) -> Result<()> {
        let remote_nonce = self.provider.get_transaction_count(self.signer.address()).await?;
        let pending_nonce = remote_nonce.low_u64();

        let restored = self.journal.restore()?;
        let mut queue = restored.unwrap_or_else(|| GasQueue::new(pending_nonce));
        if queue.base_nonce() < pending_nonce {
            // The chain has moved past what the journal remembered:
            // rebuild from the provider's nonce.
            warn!(target: "multi-responder", "journal base_nonce {} behind remote nonce {}, rebuilding", queue.base_nonce(), pending_nonce);
            queue = GasQueue::new(pending_nonce);
        }
        *self.queue.lock() = queue;
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn mined_nonce(&self) -> u64 {
        self.queue.lock().base_nonce()
    }

    pub fn last_broadcast_error(&self) -> Option<String> {
        self.last_broadcast_error.lock().clone()
    }

    pub fn is_stuck(&self, identifier: &PisaTransactionIdentifier) -> bool {
        self.stuck.lock().contains(identifier)
    }

    pub fn has_ended(&self, appointment_id: H256) -> bool {
        self.ended.lock().contains(&appointment_id)
    }

    /// Applies every action from one `detect_changes` call, in order —
    /// actions emitted for head N are applied to the Gas Queue before any
    /// block N+1 is processed — broadcasting whatever the resulting
    /// `difference` reveals is new.
    pub async fn apply_actions(
        &self,
        actions: Vec<ResponderAction>,
        resolver: &dyn AppointmentResolver,
        current_gas_price: U256,
    ) -> Result<()> {
        for action in actions {
            if let Err(e) = self.apply_one(action, resolver, current_gas_price).await {
                error!(target: "multi-responder", "action application failed: {e}");
            }
        }
        Ok(())
    }

    async fn apply_one(
        &self,
        action: ResponderAction,
        resolver: &dyn AppointmentResolver,
        current_gas_price: U256,
    ) -> Result<()> {
        match action {
            ResponderAction::ReEnqueueMissingItems(ids) => {
                for id in ids {
                    self.re_enqueue_one(id, resolver, current_gas_price).await?;
                }
            }
            ResponderAction::TxMined { nonce, .. } => {
                self.consume(nonce)?;
            }
            ResponderAction::CheckResponderBalance => {
                self.check_balance().await;
            }
            ResponderAction::EndResponse { appointment_id } => {
                self.ended.lock().insert(appointment_id);
                info!(target: "multi-responder", "appointment {:?} confirmed, dropping tracking", appointment_id);
            }
        }
        Ok(())
    }

    async fn re_enqueue_one(
        &self,
        appointment_id: H256,
        resolver: &dyn AppointmentResolver,
        current_gas_price: U256,
    ) -> Result<()> {
        let Some((identifier, request)) = resolver.resolve(appointment_id) else {
            return Err(ErrorKind::UnresolvedAppointment(appointment_id).into());
        };

        let prev = self.queue.lock().clone();
        if prev.get(&identifier).is_some() {
            // Already queued — the Multi-Responder de-dupes by identifier.
            return Ok(());
        }

        let next = prev.add(request, identifier.clone(), current_gas_price, self.policy.floor)?;
        self.commit(prev, next.clone()).await?;
        self.broadcast_new_item(&next, &identifier).await;
        Ok(())
    }

    fn consume(&self, nonce: u64) -> Result<()> {
        let prev = self.queue.lock().clone();
        if nonce < prev.base_nonce() {
            // Already consumed (duplicate TxMined notification) — ignore.
            return Ok(());
        }
        let next = prev.consume(nonce)?;
        self.journal.append(&next)?;
        *self.queue.lock() = next;
        Ok(())
    }

    async fn check_balance(&self) {
        match self.provider.get_balance(self.signer.address()).await {
            Ok(balance) if balance.is_zero() => {
                warn!(target: "multi-responder", "responder balance is zero");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "multi-responder", "balance probe failed: {e}");
            }
        }
    }

    /// Gas-bumping pass, run once per new head against every item
    /// still pending (not yet consumed by a `TxMined`). Items at the cap
    /// are marked stuck and a fatal signal is returned for the operator,
    /// but the queue keeps the item in place rather than dropping it.
    pub async fn bump_unmined(&self) -> Vec<PisaTransactionIdentifier> {
        let prev = self.queue.lock().clone();
        let mut next = prev.clone();
        let mut newly_stuck = Vec::new();

        for item in prev.items() {
            if item.gas_price >= self.policy.max_gas_price {
                if self.stuck.lock().insert(item.identifier.clone()) {
                    newly_stuck.push(item.identifier.clone());
                    error!(target: "multi-responder", "identifier {:?} stuck at max gas price {}", item.identifier, self.policy.max_gas_price);
                }
                continue;
            }
            let bumped_price = self.policy.bumped(item.gas_price);
            match next.bump(&item.identifier, bumped_price) {
                Ok(updated) => next = updated,
                Err(e) => warn!(target: "multi-responder", "bump failed for {:?}: {e}", item.identifier),
            }
        }

        if next.difference(&prev).is_empty() {
            return newly_stuck;
        }

        if let Err(e) = self.journal.append(&next) {
            error!(target: "multi-responder", "journal append failed during gas bump: {e}");
            return newly_stuck;
        }
        let diff = next.difference(&prev);
        *self.queue.lock() = next.clone();
        for item in &diff {
            self.broadcast_new_item(&next, &item.identifier).await;
        }
        newly_stuck
    }

    async fn commit(&self, _prev: GasQueue, next: GasQueue) -> Result<()> {
        self.journal.append(&next)?;
        *self.queue.lock() = next;
        Ok(())
    }

    async fn broadcast_new_item(&self, queue: &GasQueue, identifier: &PisaTransactionIdentifier) {
        let Some(item) = queue.get(identifier) else { return };
        let unsigned = UnsignedTransaction {
            chain_id: self.chain_id,
            to: identifier.to,
            data: identifier.data.clone(),
            value: identifier.value,
            gas_limit: identifier.gas_limit,
            gas_price: item.gas_price,
            nonce: item.nonce,
        };
        let raw = match self.signer.sign(&unsigned) {
            Ok(raw) => raw,
            Err(e) => {
                *self.last_broadcast_error.lock() = Some(e.to_string());
                error!(target: "multi-responder", "signing failed for nonce {}: {e}", item.nonce);
                return;
            }
        };
        // Fire-and-forget: the reducer framework, not the network ack, is
        // the source of truth for "is this mined".
        if let Err(e) = self.provider.send_raw_transaction(raw).await {
            *self.last_broadcast_error.lock() = Some(e.to_string());
            warn!(target: "multi-responder", "broadcast failed for nonce {}: {e}", item.nonce);
        }
    }
}

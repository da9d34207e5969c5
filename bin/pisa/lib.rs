//! PISA's operator-facing wiring: Block Cache → Block Processor → Reducer
//! Framework → Multi-Responder, behind a small [`PisaHandle`] health
//! surface, split between "build everything" (`run`) and "a handle main
//! can poll" (`PisaHandle`).
//!
//! A JSON-RPC `Provider` implementation is out of scope here; `run` is
//! generic over any `P: Provider`, and `bin/pisa`'s `main` wires it against
//! [`pisa_provider::fake::FakeProvider`] until a production client exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use ethereum_types::{Address, H256};
use log::{error, info};

use block_cache::BlockItemStore;
use block_processor::{BlockProcessor, NewHeadEvent};
use gas_queue::QueueRequest;
use multi_responder::{AppointmentResolver, FakeSigner, GasBumpPolicy, MultiResponder, Signer};
use pisa_provider::Provider;
use pisa_store::{AppointmentStore, Store};
use pisa_types::PisaTransactionIdentifier;
use reducer_framework::ReducerFramework;
use responder_component::{ResponderAggregateState, ResponderComponent};

/// Resolves a tracked appointment id against the [`AppointmentStore`],
/// building the [`QueueRequest`] the Multi-Responder needs to (re)enqueue
/// it: the Responder Component and Multi-Responder consult the appointment
/// store to resolve appointmentId → Appointment.
struct StoreBackedResolver {
    appointments: AppointmentStore,
}

impl AppointmentResolver for StoreBackedResolver {
    fn resolve(&self, appointment_id: H256) -> Option<(PisaTransactionIdentifier, QueueRequest)> {
        let appointment = self.appointments.get(appointment_id).ok().flatten()?;
        Some((
            appointment.identifier.clone(),
            QueueRequest {
                appointment_id,
                deadline_block: appointment.end_block,
            },
        ))
    }
}

/// Health surface exposed to the operator CLI.
pub struct PisaHandle<P: Provider> {
    block_processor: Arc<BlockProcessor<P>>,
    multi_responder: Arc<MultiResponder<P>>,
}

impl<P: Provider + 'static> PisaHandle<P> {
    pub fn current_head(&self) -> Option<H256> {
        self.block_processor.head_hash()
    }

    pub fn queue_depth(&self) -> usize {
        self.multi_responder.queue_depth()
    }

    pub fn mined_nonce(&self) -> u64 {
        self.multi_responder.mined_nonce()
    }

    pub fn last_broadcast_error(&self) -> Option<String> {
        self.multi_responder.last_broadcast_error()
    }
}

/// Everything `run` assembles, kept alive for as long as the service runs.
/// Once `start` returns, the pipeline requires no further polling from
/// `main` beyond what the provider's own "new block" notification drives
/// through the listener installed here.
pub struct Pisa<P: Provider> {
    pub block_processor: Arc<BlockProcessor<P>>,
    pub multi_responder: Arc<MultiResponder<P>>,
    pub responder_component: Arc<ResponderComponent>,
    pub appointments: AppointmentStore,
}

impl<P: Provider + 'static> Pisa<P> {
    pub fn handle(&self) -> PisaHandle<P> {
        PisaHandle {
            block_processor: self.block_processor.clone(),
            multi_responder: self.multi_responder.clone(),
        }
    }
}

/// Builds and starts the full pipeline: opens the store, wires the Block
/// Cache (owned by the Block Processor) to the Reducer
/// Framework and the Responder Component, and installs the listener that
/// drives the Multi-Responder from every new head.
pub async fn run<P: Provider + 'static>(
    provider: Arc<P>,
    store: Arc<dyn Store>,
    signing_address: Address,
    signer: Arc<dyn Signer>,
    config: &pisa_config::Config,
) -> block_processor::Result<Pisa<P>> {
    let block_processor = Arc::new(BlockProcessor::new(provider.clone(), store.clone(), config.cache.max_depth));
    block_processor.start().await?;

    let responder_component = Arc::new(ResponderComponent::new(signing_address, config.cache.max_depth));
    let items = BlockItemStore::new(store.clone());
    let framework = Arc::new(ReducerFramework::new(responder_component.clone(), items));

    let appointments = AppointmentStore::new(store.clone());

    let policy = GasBumpPolicy {
        factor_ppm: config.responder.gas_bump_factor_ppm,
        max_gas_price: config.responder.max_gas_price,
        floor: config.responder.gas_bump_floor,
    };
    let multi_responder = Arc::new(MultiResponder::new(
        provider.clone(),
        signer,
        store.clone(),
        config.chain.chain_id,
        policy,
    ));
    multi_responder
        .start()
        .await
        .map_err(|e| block_processor::ErrorKind::BlockNotFound(e.to_string()))?;

    let bp_for_listener = block_processor.clone();
    let rc = responder_component.clone();
    let fw = framework.clone();
    let mr = multi_responder.clone();
    let appt = appointments.clone();
    let gas_price_floor = config.responder.gas_bump_floor;

    block_processor.add_listener(Box::new(move |event: &NewHeadEvent| {
        let actions = bp_for_listener.with_cache(|cache| match fw.diff_states(cache, event.prev_head, event.head.header.hash) {
            Ok((from, to)) => {
                let empty = ResponderAggregateState { block_number: 0, items: BTreeMap::new() };
                rc.detect_changes(&from.unwrap_or(empty), &to)
            }
            Err(e) => {
                error!(target: "pisa", "failed to compute responder state diff: {e}");
                Vec::new()
            }
        });

        if actions.is_empty() {
            return;
        }

        let mr = mr.clone();
        let resolver = StoreBackedResolver { appointments: appt.clone() };
        // Actions for head N are applied before block N+1 is processed in
        // the single-threaded-cooperative core; the broadcast itself is the
        // one suspension point this wiring defers to a spawned task rather
        // than blocking the synchronous listener callback on.
        tokio::spawn(async move {
            if let Err(e) = mr.apply_actions(actions, &resolver, gas_price_floor).await {
                error!(target: "pisa", "failed to apply responder actions: {e}");
            }
        });
    }))?;

    Ok(Pisa {
        block_processor,
        multi_responder,
        responder_component,
        appointments,
    })
}

/// Placeholder signer until a production wallet integration exists (the
/// signer is an external collaborator). An explicit "dev mode" fallback
/// over silently degrading behavior.
pub fn default_signer(address: Address) -> Arc<dyn Signer> {
    info!(target: "pisa", "no production signer configured; using the deterministic test signer");
    Arc::new(FakeSigner::new(address))
}

//! Append-only journal of gas-queue mutations, under the `responder`
//! namespace: every queue mutation is journalled, so that a restart
//! reconstructs the queue before the reducer framework replays the latest
//! head. Each entry is the queue's full state immediately after a
//! mutation — simpler to reason about than a diff log, and restoring is
//! just "read the newest entry" — with old entries compacted away every
//! `snapshot_every` writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pisa_store::{Store, WriteBatch};

use gas_queue::{GasQueue, QueueItem};

const NAMESPACE: &str = "responder";
const SEQ_KEY: &[u8] = b"seq";

#[derive(serde::Serialize, serde::Deserialize)]
struct QueueSnapshot {
    base_nonce: u64,
    items: Vec<QueueItem>,
}

pub struct ResponderJournal {
    store: Arc<dyn Store>,
    snapshot_every: u64,
    seq: AtomicU64,
}

impl ResponderJournal {
    pub fn new(store: Arc<dyn Store>, snapshot_every: u64) -> Self {
        let seq = store
            .get(NAMESPACE, SEQ_KEY)
            .ok()
            .flatten()
            .and_then(|bytes| serde_json::from_slice::<u64>(&bytes).ok())
            .unwrap_or(0);
        ResponderJournal {
            store,
            snapshot_every: snapshot_every.max(1),
            seq: AtomicU64::new(seq),
        }
    }

    fn entry_key(seq: u64) -> Vec<u8> {
        format!("entry:{seq:020}").into_bytes()
    }

    /// Appends `queue`'s current state as the newest journal entry,
    /// compacting everything older than `snapshot_every` entries back.
    pub fn append(&self, queue: &GasQueue) -> pisa_store::Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = QueueSnapshot {
            base_nonce: queue.base_nonce(),
            items: queue.items().to_vec(),
        };
        let bytes = serde_json::to_vec(&snapshot).expect("QueueSnapshot serializes");

        let mut batch = WriteBatch::new();
        batch.put(NAMESPACE, &Self::entry_key(seq), &bytes);
        batch.put(NAMESPACE, SEQ_KEY, &serde_json::to_vec(&seq).expect("u64 serializes"));
        if seq > self.snapshot_every {
            batch.delete(NAMESPACE, &Self::entry_key(seq - self.snapshot_every));
        }
        self.store.write_batch(batch)
    }

    /// Reconstructs the most recently journalled queue, or `None` if
    /// nothing has ever been appended (a fresh responder).
    pub fn restore(&self) -> pisa_store::Result<Option<GasQueue>> {
        let seq = self.seq.load(Ordering::SeqCst);
        if seq == 0 {
            return Ok(None);
        }
        match self.store.get(NAMESPACE, &Self::entry_key(seq))? {
            Some(bytes) => {
                let snapshot: QueueSnapshot =
                    serde_json::from_slice(&bytes).unwrap_or(QueueSnapshot { base_nonce: 0, items: Vec::new() });
                Ok(Some(GasQueue::from_parts(snapshot.base_nonce, snapshot.items)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{Address, H256, U256};
    use pisa_store::MemoryStore;
    use pisa_types::PisaTransactionIdentifier;

    fn identifier(tag: u64) -> PisaTransactionIdentifier {
        PisaTransactionIdentifier {
            chain_id: 1,
            to: Address::from_low_u64_be(tag),
            data: parity_bytes::Bytes::new(),
            value: U256::zero(),
            gas_limit: U256::from(21_000),
        }
    }

    fn request(tag: u64) -> gas_queue::QueueRequest {
        gas_queue::QueueRequest {
            appointment_id: H256::from_low_u64_be(tag),
            deadline_block: 10,
        }
    }

    #[test]
    fn restore_on_fresh_store_is_none() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let journal = ResponderJournal::new(store, 5);
        assert!(journal.restore().unwrap().is_none());
    }

    #[test]
    fn restore_reconstructs_the_latest_appended_queue() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let journal = ResponderJournal::new(store.clone(), 5);

        let q0 = GasQueue::new(0);
        let q1 = q0.add(request(1), identifier(1), U256::from(10), U256::zero()).unwrap();
        journal.append(&q1).unwrap();
        let q2 = q1.add(request(2), identifier(2), U256::from(10), U256::zero()).unwrap();
        journal.append(&q2).unwrap();

        let restored = ResponderJournal::new(store, 5).restore().unwrap().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.base_nonce(), 0);
    }

    #[test]
    fn compaction_drops_entries_older_than_snapshot_window() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let journal = ResponderJournal::new(store.clone(), 2);
        let mut queue = GasQueue::new(0);
        for i in 0..5u64 {
            queue = queue.add(request(i), identifier(i), U256::from(10), U256::zero()).unwrap();
            journal.append(&queue).unwrap();
        }
        assert!(store.get(NAMESPACE, &ResponderJournal::entry_key(1)).unwrap().is_none());
        assert!(store.get(NAMESPACE, &ResponderJournal::entry_key(5)).unwrap().is_some());
    }
}

//! Persistent store interface and an in-memory reference implementation.
//! Disk-backed storage primitives are an external collaborator — this
//! crate owns only the trait and the witness needed for tests and for a
//! single-process deployment.

pub mod appointment;
pub mod error;
pub mod memory;

pub use appointment::AppointmentStore;
pub use error::{Error, ErrorKind, Result};
pub use memory::MemoryStore;

/// A single write queued inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub(crate) enum Op {
    Put(Vec<u8>),
    Delete,
}

/// A batch of writes across one or more namespaces, committed atomically.
///
/// Buffer first, commit once. A batch touching the same `(namespace, key)`
/// twice is rejected at
/// commit time rather than silently applying the last write, so the Block
/// Cache's "drop derived items atomically with their block" contract can't
/// be quietly broken by an accidental double-write.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(String, Vec<u8>, Op)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch { ops: Vec::new() }
    }

    pub fn put(&mut self, namespace: &str, key: &[u8], value: &[u8]) -> &mut Self {
        self.ops
            .push((namespace.to_string(), key.to_vec(), Op::Put(value.to_vec())));
        self
    }

    pub fn delete(&mut self, namespace: &str, key: &[u8]) -> &mut Self {
        self.ops
            .push((namespace.to_string(), key.to_vec(), Op::Delete));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A namespaced key/value store with atomic batch commits.
///
/// Reads outside a batch see the last committed value; a missing key is
/// `Ok(None)`, distinguishable from a backend failure (`Err`).
pub trait Store: Send + Sync {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(namespace, key, value);
        self.write_batch(batch)
    }

    fn delete(&self, namespace: &str, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(namespace, key);
        self.write_batch(batch)
    }

    /// Scan all keys in `namespace`. Used by the Block Cache on restart to
    /// rebuild its graph from the block-stub namespace.
    fn scan(&self, namespace: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    fn write_batch(&self, batch: WriteBatch) -> Result<()>;
}

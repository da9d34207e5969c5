//! An in-memory witness of the [`Store`] trait: sufficient for tests and
//! for a single-process deployment.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{Op, Result, Store, WriteBatch};

#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    fn scan(&self, namespace: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        // Reject a batch that writes the same (namespace, key) twice before
        // touching any state, so a partial commit can never happen.
        let mut seen = std::collections::HashSet::new();
        for (namespace, key, _) in &batch.ops {
            if !seen.insert((namespace.clone(), key.clone())) {
                return Err(crate::ErrorKind::ConflictingBatchEntry(
                    namespace.clone(),
                    key.clone(),
                )
                .into());
            }
        }

        let mut namespaces = self.namespaces.write();
        for (namespace, key, op) in batch.ops {
            let ns = namespaces.entry(namespace).or_default();
            match op {
                Op::Put(value) => {
                    ns.insert(key, value);
                }
                Op::Delete => {
                    ns.remove(&key);
                }
            }
        }
        Ok(())
    }
}

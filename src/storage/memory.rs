use super::types::{StoreError, StoreTransaction, TransactionalStore};

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Caches = Arc<DashMap<String, DashMap<String, Vec<u8>>>>;

/// In-process `TransactionalStore`.
///
/// Transactions are serialized by a single writer lock held from `begin` until the
/// transaction is committed or dropped, so every transaction observes a state no other
/// writer can change underneath it. Plain reads outside a transaction see the last
/// committed state.
#[derive(Clone)]
pub struct MemoryStore {
    caches: Caches,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            caches: Arc::new(DashMap::new()),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache_len(&self, cache: &str) -> usize {
        self.caches.get(cache).map(|c| c.len()).unwrap_or(0)
    }

    pub fn entry_count(&self) -> usize {
        self.caches.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn get(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(read_committed(&self.caches, cache, key))
    }

    async fn entries(&self, cache: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut entries = Vec::new();
        if let Some(map) = self.caches.get(cache) {
            for entry in map.iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            caches: self.caches.clone(),
            writes: HashMap::new(),
            _guard: guard,
        }))
    }
}

struct MemoryTransaction {
    caches: Caches,
    /// `None` marks a pending removal.
    writes: HashMap<(String, String), Option<Vec<u8>>>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.writes.get(&(cache.to_string(), key.to_string())) {
            return Ok(pending.clone());
        }
        Ok(read_committed(&self.caches, cache, key))
    }

    async fn keys(&mut self, cache: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: BTreeSet<String> = self
            .caches
            .get(cache)
            .map(|map| map.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default();

        for ((pending_cache, key), value) in &self.writes {
            if pending_cache != cache {
                continue;
            }
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }

        Ok(keys.into_iter().collect())
    }

    fn put(&mut self, cache: &str, key: &str, value: Vec<u8>) {
        self.writes.insert((cache.to_string(), key.to_string()), Some(value));
    }

    fn remove(&mut self, cache: &str, key: &str) {
        self.writes.insert((cache.to_string(), key.to_string()), None);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            caches,
            writes,
            _guard,
        } = *self;
        let write_count = writes.len();
        for ((cache, key), value) in writes {
            match value {
                Some(value) => {
                    caches
                        .entry(cache)
                        .or_insert_with(DashMap::new)
                        .insert(key, value);
                }
                None => {
                    if let Some(map) = caches.get(&cache) {
                        map.remove(&key);
                    }
                }
            }
        }
        tracing::trace!("Committed transaction with {} write(s)", write_count);
        Ok(())
    }
}

fn read_committed(caches: &Caches, cache: &str, key: &str) -> Option<Vec<u8>> {
    let map = caches.get(cache)?;
    let value = map.get(key)?;
    Some(value.value().clone())
}

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode or decode value: {0}")]
    Codec(#[from] bincode::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

/// Replicated key-value store with serializable multi-key transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Committed value of one key.
    async fn get(&self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Every committed entry of a cache.
    async fn entries(&self, cache: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Opens a serializable transaction spanning any keys of any caches.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads through this transaction's own pending writes.
    async fn get(&mut self, cache: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn keys(&mut self, cache: &str) -> Result<Vec<String>, StoreError>;

    fn put(&mut self, cache: &str, key: &str, value: Vec<u8>);

    fn remove(&mut self, cache: &str, key: &str);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub async fn get_typed<T: DeserializeOwned>(
    txn: &mut dyn StoreTransaction,
    cache: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match txn.get(cache, key).await? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put_typed<T: Serialize>(
    txn: &mut dyn StoreTransaction,
    cache: &str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = bincode::serialize(value)?;
    txn.put(cache, key, bytes);
    Ok(())
}

//! Transactional Storage Module
//!
//! The registry keeps its shared state (available/unavailable descriptor sets and stability
//! scores) in a replicated key-value store with multi-key serializable transactions. This
//! module defines that interface and ships an in-process implementation.
//!
//! ## Core Concepts
//! - **Caches**: named key spaces (`available`, `unavailable`, `stability`), each a map of
//!   string keys to opaque byte values.
//! - **Transactions**: buffered writes over any number of keys and caches, applied
//!   atomically on `commit`. Dropping a transaction without committing rolls it back.
//! - **Encoding**: values are `bincode`-encoded through the `get_typed`/`put_typed` helpers.

pub mod memory;
pub mod types;

pub use memory::MemoryStore;
pub use types::{StoreError, StoreTransaction, TransactionalStore, get_typed, put_typed};

#[cfg(test)]
mod tests;

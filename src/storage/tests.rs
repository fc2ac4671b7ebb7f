//! Storage Module Tests
//!
//! Validates the in-process transactional store.
//!
//! ## Test Scopes
//! - **Transactions**: read-your-writes, atomic commit, rollback on drop.
//! - **Isolation**: a second transaction waits for the first to finish.
//! - **Typed helpers**: bincode encoding of registry values.

#[cfg(test)]
mod tests {
    use crate::storage::{MemoryStore, StoreTransaction, TransactionalStore, get_typed, put_typed};
    use std::sync::Arc;
    use std::time::Duration;

    // ============================================================
    // TRANSACTIONS
    // ============================================================

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();

        let mut txn = store.begin().await.unwrap();
        txn.put("available", "orders", b"a".to_vec());
        txn.put("stability", "http://h:1/orders", b"b".to_vec());

        // Not visible before commit
        assert!(store.get("available", "orders").await.unwrap().is_none());

        txn.commit().await.unwrap();

        assert_eq!(store.get("available", "orders").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let store = MemoryStore::new();

        let mut txn = store.begin().await.unwrap();
        txn.put("c", "k", b"v".to_vec());
        assert_eq!(txn.get("c", "k").await.unwrap(), Some(b"v".to_vec()));

        txn.remove("c", "k");
        assert_eq!(txn.get("c", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();

        {
            let mut txn = store.begin().await.unwrap();
            txn.put("c", "k", b"v".to_vec());
        }

        assert!(store.get("c", "k").await.unwrap().is_none());

        // The writer lock was released by the drop
        let txn = store.begin().await.unwrap();
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_merge_pending_writes() {
        let store = MemoryStore::new();
        let mut seed = store.begin().await.unwrap();
        seed.put("c", "a", vec![1]);
        seed.put("c", "b", vec![2]);
        seed.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.remove("c", "a");
        txn.put("c", "z", vec![3]);
        txn.put("other", "x", vec![4]);

        assert_eq!(txn.keys("c").await.unwrap(), vec!["b".to_string(), "z".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_commits() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.put("c", "k", vec![1]);
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.remove("c", "k");
        txn.remove("missing", "k");
        txn.commit().await.unwrap();

        assert_eq!(store.cache_len("c"), 0);
    }

    // ============================================================
    // ISOLATION
    // ============================================================

    #[tokio::test]
    async fn test_transactions_are_serialized() {
        let store = Arc::new(MemoryStore::new());

        let first = store.begin().await.unwrap();

        let contender = store.clone();
        let second = tokio::spawn(async move {
            let mut txn = contender.begin().await.unwrap();
            let seen = txn.get("c", "k").await.unwrap();
            txn.put("c", "k", b"second".to_vec());
            txn.commit().await.unwrap();
            seen
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished(), "second transaction must wait for the first");

        let mut first = first;
        first.put("c", "k", b"first".to_vec());
        first.commit().await.unwrap();

        let seen_by_second = second.await.unwrap();
        assert_eq!(seen_by_second, Some(b"first".to_vec()));
        assert_eq!(store.get("c", "k").await.unwrap(), Some(b"second".to_vec()));
    }

    // ============================================================
    // TYPED HELPERS
    // ============================================================

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = MemoryStore::new();

        let mut txn = store.begin().await.unwrap();
        put_typed(txn.as_mut(), "c", "levels", &vec![1i32, 5, 10]).unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let levels: Option<Vec<i32>> = get_typed(txn.as_mut(), "c", "levels").await.unwrap();
        assert_eq!(levels, Some(vec![1, 5, 10]));

        let missing: Option<Vec<i32>> = get_typed(txn.as_mut(), "c", "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_entries_lists_committed_values() {
        let store = MemoryStore::new();
        let mut txn: Box<dyn StoreTransaction> = store.begin().await.unwrap();
        txn.put("stability", "a", vec![0]);
        txn.put("stability", "b", vec![1]);
        txn.commit().await.unwrap();

        let mut entries = store.entries("stability").await.unwrap();
        entries.sort();
        assert_eq!(entries, vec![("a".to_string(), vec![0]), ("b".to_string(), vec![1])]);
        assert!(store.entries("empty").await.unwrap().is_empty());
    }
}

//! Integration tests for the distributed bounded semaphore.
//!
//! These run the full protocol (advisory read, mutex spinlock, re-check,
//! whole-document write) against the in-memory backend, including the
//! blocking behavior at capacity.

use std::sync::Arc;
use std::time::Duration;

use reboot_lock::{DistributedLock, MemoryStore, DEFAULT_GROUP};

fn new_lock() -> DistributedLock {
    DistributedLock::new(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn test_acquire_owns_release_round_trip() {
    let lock = new_lock();

    assert!(!lock.owns(DEFAULT_GROUP, "A").await.unwrap());

    lock.acquire(DEFAULT_GROUP, "A").await.unwrap();
    assert!(lock.owns(DEFAULT_GROUP, "A").await.unwrap());

    lock.release(DEFAULT_GROUP, "A").await.unwrap();
    assert!(!lock.owns(DEFAULT_GROUP, "A").await.unwrap());
}

#[tokio::test]
async fn test_fresh_group_defaults_to_capacity_one() {
    let lock = new_lock();
    let state = lock.group_state("brand-new").await.unwrap();
    assert_eq!(state.capacity, 1);
    assert!(state.holders.is_empty());
}

#[tokio::test]
async fn test_second_acquire_blocks_until_release() {
    let lock = new_lock();

    // Node A takes the single default slot.
    lock.acquire(DEFAULT_GROUP, "A").await.unwrap();
    let state = lock.group_state(DEFAULT_GROUP).await.unwrap();
    assert_eq!(state.holders, vec!["A"]);

    // Node B blocks.
    let pending = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.acquire(DEFAULT_GROUP, "B").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    // A releases; B's pending acquire completes.
    lock.release(DEFAULT_GROUP, "A").await.unwrap();
    pending.await.unwrap().unwrap();

    let state = lock.group_state(DEFAULT_GROUP).await.unwrap();
    assert_eq!(state.holders, vec!["B"]);
}

#[tokio::test]
async fn test_capacity_bounds_concurrent_acquires() {
    let lock = new_lock();
    lock.set_capacity("g", 2).await.unwrap();

    let tasks: Vec<_> = ["n1", "n2", "n3", "n4"]
        .iter()
        .map(|id| {
            let lock = lock.clone();
            let id = id.to_string();
            tokio::spawn(async move { lock.acquire("g", &id).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let granted: Vec<bool> = tasks.iter().map(|t| t.is_finished()).collect();
    assert_eq!(granted.iter().filter(|g| **g).count(), 2);

    let state = lock.group_state("g").await.unwrap();
    assert_eq!(state.holder_count(), 2);

    // Releasing the current holders lets the blocked acquires through.
    for id in state.holders.clone() {
        lock.release("g", &id).await.unwrap();
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(lock.group_state("g").await.unwrap().holder_count(), 2);
}

#[tokio::test]
async fn test_set_capacity_on_missing_group_does_not_block() {
    let lock = new_lock();

    tokio::time::timeout(Duration::from_secs(1), lock.set_capacity("fresh", 3))
        .await
        .expect("set_capacity must not block on a fresh group")
        .unwrap();

    let state = lock.group_state("fresh").await.unwrap();
    assert_eq!(state.capacity, 3);
    assert!(state.holders.is_empty());
}

#[tokio::test]
async fn test_set_capacity_rejects_non_positive() {
    let lock = new_lock();
    assert!(lock.set_capacity("g", 0).await.is_err());
    assert!(lock.set_capacity("g", -2).await.is_err());
}

#[tokio::test]
async fn test_retried_acquire_is_idempotent() {
    let lock = new_lock();

    lock.acquire("g", "A").await.unwrap();
    // Same id retries after a lost response: still a single slot.
    lock.acquire("g", "A").await.unwrap();

    let state = lock.group_state("g").await.unwrap();
    assert_eq!(state.holders, vec!["A"]);
}

#[tokio::test]
async fn test_release_without_holding_is_a_noop() {
    let lock = new_lock();
    lock.acquire("g", "A").await.unwrap();

    lock.release("g", "ghost").await.unwrap();

    let state = lock.group_state("g").await.unwrap();
    assert_eq!(state.holders, vec!["A"]);
}

#[tokio::test]
async fn test_raising_capacity_unblocks_waiter() {
    let lock = new_lock();
    lock.acquire("g", "A").await.unwrap();

    let pending = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.acquire("g", "B").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    // The waiter watches the data key, so a capacity bump wakes it.
    lock.set_capacity("g", 2).await.unwrap();
    pending.await.unwrap().unwrap();

    let state = lock.group_state("g").await.unwrap();
    assert_eq!(state.holders, vec!["A", "B"]);
}

#[tokio::test]
async fn test_groups_are_independent() {
    let lock = new_lock();
    lock.acquire("alpha", "A").await.unwrap();

    // Capacity 1 in "alpha" does not gate "beta".
    tokio::time::timeout(Duration::from_secs(1), lock.acquire("beta", "A"))
        .await
        .expect("independent group must not block")
        .unwrap();

    assert!(lock.owns("alpha", "A").await.unwrap());
    assert!(lock.owns("beta", "A").await.unwrap());
}

#[tokio::test]
async fn test_backend_probe_reports_available() {
    let store = Arc::new(MemoryStore::new());
    let lock = DistributedLock::new(store);
    assert!(lock.is_available().await);
}

//! The distributed bounded semaphore.
//!
//! Protocol per group, using only the [`KvStore`] primitives:
//!
//! 1. An advisory read of the holder document. If the group is at capacity,
//!    wait on a revision-indexed watch of the *data* key and re-read.
//! 2. Take the group mutex: CAS `"0" -> "1"`, watching the mutex key past
//!    the observed revision on conflict.
//! 3. Re-read the document under the mutex. Only if it is still below
//!    capacity append the holder and write the document back whole.
//!    If another node won the race in between, release and start over.
//!
//! The pre-mutex read is advisory only; the grant decision is always made
//! from the re-read under the mutex.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::holders::GroupDoc;
use crate::store::{KvError, KvStore};

/// Group used when the caller does not name one.
pub const DEFAULT_GROUP: &str = "default";

/// Default key prefix for lock groups in the backend.
pub const DEFAULT_ROOT: &str = "/fleet/reboot/locks";

const MUTEX_FREE: &str = "0";
const MUTEX_HELD: &str = "1";

/// Semaphore errors surfaced to callers. Contention never appears here; it
/// is absorbed by the retry loops.
#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Backend(#[from] KvError),

    /// The stored holder document could not be parsed.
    #[error("malformed lock document for group '{group}'")]
    Corrupt {
        group: String,
        #[source]
        source: serde_json::Error,
    },

    /// Capacity must be at least one.
    #[error("invalid capacity {0}, must be at least 1")]
    InvalidCapacity(i64),
}

/// A named, capacity-bounded, fleet-wide semaphore.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    root: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_root(store, DEFAULT_ROOT)
    }

    pub fn with_root(store: Arc<dyn KvStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    fn mutex_key(&self, group: &str) -> String {
        format!("{}/{}/mutex", self.root, group)
    }

    fn data_key(&self, group: &str) -> String {
        format!("{}/{}/data", self.root, group)
    }

    /// Whether the backend is reachable. Feature detection for callers;
    /// an unavailable backend is not an error.
    pub async fn is_available(&self) -> bool {
        self.store.probe().await
    }

    /// Acquire one slot in `group` for `id`, blocking while the group is at
    /// capacity. Acquiring a slot the id already holds succeeds idempotently.
    pub async fn acquire(&self, group: &str, id: &str) -> Result<(), LockError> {
        self.ensure_group(group).await?;

        loop {
            // Advisory read: wait outside the mutex while the group is full.
            let node = self.store.get(&self.data_key(group)).await?;
            let doc = self.parse_doc(group, &node.value)?;
            // A retry after a lost response already holds its slot; a full
            // group must not make it wait for capacity it is occupying.
            if doc.contains(id) {
                debug!(group, id, "already a holder");
                return Ok(());
            }
            if doc.is_full() {
                debug!(
                    group,
                    holders = doc.holder_count(),
                    max = doc.capacity,
                    "lock group at capacity, waiting"
                );
                self.store
                    .watch(&self.data_key(group), node.modified_index + 1)
                    .await?;
                continue;
            }

            self.acquire_mutex(group).await?;
            let granted = match self.try_grant(group, id).await {
                Ok(granted) => granted,
                Err(e) => {
                    let _ = self.release_mutex(group).await;
                    return Err(e);
                }
            };
            self.release_mutex(group).await?;

            if granted {
                debug!(group, id, "lock acquired");
                return Ok(());
            }
            // Another node filled the last slot between the advisory read
            // and the mutex; go back to waiting.
        }
    }

    /// The grant decision, made under the group mutex.
    async fn try_grant(&self, group: &str, id: &str) -> Result<bool, LockError> {
        let node = self.store.get(&self.data_key(group)).await?;
        let mut doc = self.parse_doc(group, &node.value)?;
        if doc.is_full() {
            return Ok(false);
        }
        if doc.add_holder(id) {
            self.store.set(&self.data_key(group), &doc.to_json()).await?;
        }
        Ok(true)
    }

    /// Release `id`'s slot in `group`. Succeeds without touching the backend
    /// state if the id holds nothing.
    pub async fn release(&self, group: &str, id: &str) -> Result<(), LockError> {
        if !self.owns(group, id).await? {
            return Ok(());
        }

        self.acquire_mutex(group).await?;
        let result = self.try_remove(group, id).await;
        let released = self.release_mutex(group).await;
        result?;
        released?;
        debug!(group, id, "lock released");
        Ok(())
    }

    async fn try_remove(&self, group: &str, id: &str) -> Result<(), LockError> {
        let node = self.store.get(&self.data_key(group)).await?;
        let mut doc = self.parse_doc(group, &node.value)?;
        if doc.remove_holder(id) {
            self.store.set(&self.data_key(group), &doc.to_json()).await?;
        }
        Ok(())
    }

    /// Whether `id` currently holds a slot in `group`. Read-only, no mutex.
    pub async fn owns(&self, group: &str, id: &str) -> Result<bool, LockError> {
        match self.store.get(&self.data_key(group)).await {
            Ok(node) => Ok(self.parse_doc(group, &node.value)?.contains(id)),
            Err(KvError::NotFound { .. }) => {
                self.init_group(group).await?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set the group's capacity. Auto-initializes a missing group, so this
    /// never blocks waiting for someone else to create it.
    pub async fn set_capacity(&self, group: &str, capacity: i64) -> Result<(), LockError> {
        if capacity < 1 {
            return Err(LockError::InvalidCapacity(capacity));
        }

        self.acquire_mutex(group).await?;
        let result = self.try_set_capacity(group, capacity).await;
        let released = self.release_mutex(group).await;
        result?;
        released
    }

    async fn try_set_capacity(&self, group: &str, capacity: i64) -> Result<(), LockError> {
        let node = self.store.get(&self.data_key(group)).await?;
        let mut doc = self.parse_doc(group, &node.value)?;
        doc.capacity = capacity;
        self.store.set(&self.data_key(group), &doc.to_json()).await?;
        Ok(())
    }

    /// Snapshot of the group's holder document. Auto-initializes a missing
    /// group so fresh groups read as `{max: 1, holders: []}`.
    pub async fn group_state(&self, group: &str) -> Result<GroupDoc, LockError> {
        match self.store.get(&self.data_key(group)).await {
            Ok(node) => self.parse_doc(group, &node.value),
            Err(KvError::NotFound { .. }) => {
                self.init_group(group).await?;
                Ok(GroupDoc::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take the group mutex: CAS the flag from free to held, waiting on the
    /// mutex key whenever someone else holds it.
    async fn acquire_mutex(&self, group: &str) -> Result<(), LockError> {
        let key = self.mutex_key(group);
        loop {
            match self
                .store
                .compare_and_swap(&key, MUTEX_FREE, MUTEX_HELD)
                .await
            {
                Ok(_) => {
                    debug!(group, "got mutex");
                    return Ok(());
                }
                Err(KvError::CasConflict { index, .. }) => {
                    debug!(group, index, "mutex held, waiting");
                    self.store.watch(&key, index + 1).await?;
                }
                Err(KvError::NotFound { .. }) => {
                    self.init_group(group).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn release_mutex(&self, group: &str) -> Result<(), LockError> {
        self.store.set(&self.mutex_key(group), MUTEX_FREE).await?;
        Ok(())
    }

    async fn ensure_group(&self, group: &str) -> Result<(), LockError> {
        match self.store.get(&self.data_key(group)).await {
            Ok(_) => Ok(()),
            Err(KvError::NotFound { .. }) => self.init_group(group).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Create the group's keys. Creation is conditional on absence, so two
    /// nodes racing to initialize the same fresh group cannot clobber a
    /// document the winner already modified.
    async fn init_group(&self, group: &str) -> Result<(), LockError> {
        debug!(group, "initializing lock group");
        match self
            .store
            .create(&self.data_key(group), &GroupDoc::new().to_json())
            .await
        {
            Ok(_) | Err(KvError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        match self.store.create(&self.mutex_key(group), MUTEX_FREE).await {
            Ok(_) | Err(KvError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn parse_doc(&self, group: &str, value: &str) -> Result<GroupDoc, LockError> {
        GroupDoc::from_json(value).map_err(|source| LockError::Corrupt {
            group: group.to_string(),
            source,
        })
    }
}

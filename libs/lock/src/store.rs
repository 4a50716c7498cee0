//! Key-value backend interface.
//!
//! The semaphore only needs four primitives from the backend: get, set,
//! compare-and-swap, and a long-poll watch keyed on the stored revision.
//! `create` is the CAS variant against absence, used to initialize groups
//! without racing other nodes.

use async_trait::async_trait;
use thiserror::Error;

/// A stored key with its value and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvNode {
    pub key: String,
    pub value: String,

    /// Backend revision of the last write to this key. Watches are indexed
    /// against this.
    pub modified_index: u64,
}

/// Backend errors.
///
/// `NotFound` and `AlreadyExists` are initialization signals, `CasConflict`
/// is ordinary contention handled by retry loops; only `Transport`,
/// `Backend`, and `Decode` abort an operation and surface to the caller.
#[derive(Debug, Error)]
pub enum KvError {
    /// Key does not exist.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// `create` lost against a concurrent initializer.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    /// Compare-and-swap found a different current value. `index` is the
    /// revision observed by the failed comparison, suitable for watching.
    #[error("compare-and-swap conflict on {key} at index {index}")]
    CasConflict { key: String, index: u64 },

    /// The backend could not be reached or the request failed in transit.
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with an error we do not retry.
    #[error("backend error {code}: {message}")]
    Backend { code: u64, message: String },

    /// The backend answered with something we could not interpret.
    #[error("malformed backend response for {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// The flat key-value surface the semaphore is built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<KvNode, KvError>;

    /// Write a key unconditionally.
    async fn set(&self, key: &str, value: &str) -> Result<KvNode, KvError>;

    /// Write a key only if it does not exist yet.
    async fn create(&self, key: &str, value: &str) -> Result<KvNode, KvError>;

    /// Write `new` only if the current value equals `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<KvNode, KvError>;

    /// Block until the key's revision reaches at least `since_index`, then
    /// return the node. Waits for creation if the key does not exist.
    async fn watch(&self, key: &str, since_index: u64) -> Result<KvNode, KvError>;

    /// Cheap availability probe. Absence of the backend is a normal
    /// "no cluster coordination configured" state, not an error.
    async fn probe(&self) -> bool;
}

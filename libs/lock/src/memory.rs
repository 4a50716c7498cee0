//! In-process key-value store with the backend's observable semantics.
//!
//! Used by tests and local development in place of a real backend. Writes
//! bump a global revision; watches subscribe to a change channel and
//! re-check the watched key on every bump, so revision-indexed waits behave
//! exactly like the long-poll watch of the real client.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use crate::store::{KvError, KvNode, KvStore};

/// In-memory [`KvStore`] implementation.
pub struct MemoryStore {
    state: Mutex<State>,
    changed: watch::Sender<u64>,
}

struct State {
    revision: u64,
    entries: HashMap<String, KvNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(State {
                revision: 0,
                entries: HashMap::new(),
            }),
            changed,
        }
    }

    async fn write(&self, key: &str, value: &str) -> KvNode {
        let mut state = self.state.lock().await;
        state.revision += 1;
        let node = KvNode {
            key: key.to_string(),
            value: value.to_string(),
            modified_index: state.revision,
        };
        state.entries.insert(key.to_string(), node.clone());
        let revision = state.revision;
        drop(state);
        let _ = self.changed.send(revision);
        node
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<KvNode, KvError> {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::NotFound {
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: &str) -> Result<KvNode, KvError> {
        Ok(self.write(key, value).await)
    }

    async fn create(&self, key: &str, value: &str) -> Result<KvNode, KvError> {
        {
            let state = self.state.lock().await;
            if state.entries.contains_key(key) {
                return Err(KvError::AlreadyExists {
                    key: key.to_string(),
                });
            }
        }
        Ok(self.write(key, value).await)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<KvNode, KvError> {
        let current = {
            let state = self.state.lock().await;
            state.entries.get(key).cloned()
        };
        match current {
            None => Err(KvError::NotFound {
                key: key.to_string(),
            }),
            Some(node) if node.value != expected => Err(KvError::CasConflict {
                key: key.to_string(),
                index: node.modified_index,
            }),
            Some(_) => Ok(self.write(key, new).await),
        }
    }

    async fn watch(&self, key: &str, since_index: u64) -> Result<KvNode, KvError> {
        // Subscribe before the first check so a write between check and
        // wait cannot be missed.
        let mut rx = self.changed.subscribe();
        loop {
            {
                let state = self.state.lock().await;
                if let Some(node) = state.entries.get(key) {
                    if node.modified_index >= since_index {
                        return Ok(node.clone());
                    }
                }
            }
            if rx.changed().await.is_err() {
                return Err(KvError::Backend {
                    code: 0,
                    message: "memory store closed".to_string(),
                });
            }
        }
    }

    async fn probe(&self) -> bool {
        true
    }
}

//! etcd v2 HTTP client for the lock backend.
//!
//! Speaks the flat `/v2/keys` surface: plain GET/PUT, `prevValue` for
//! compare-and-swap, `prevExist=false` for create, and
//! `wait=true&waitIndex=N` for long-poll watches. Backend error codes are
//! mapped onto the [`KvError`] taxonomy (100 not found, 101 compare failed,
//! 105 already exists).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::store::{KvError, KvNode, KvStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One long-poll round. Watches re-poll on this interval so a lost signal
/// can never stall a waiter forever.
const WATCH_POLL_TIMEOUT: Duration = Duration::from_secs(60);

const CODE_NOT_FOUND: u64 = 100;
const CODE_COMPARE_FAILED: u64 = 101;
const CODE_ALREADY_EXISTS: u64 = 105;

/// Client for an etcd-v2-compatible key-value backend.
pub struct EtcdClient {
    client: reqwest::Client,
    base_url: String,
}

impl EtcdClient {
    /// Create a client for the given base URL (e.g. `http://127.0.0.1:2379`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/v2/keys{}", self.base_url, key)
    }

    async fn decode(key: &str, response: reqwest::Response) -> Result<KvNode, KvError> {
        let status = response.status();
        if status.is_success() {
            let body: KeysResponse = response.json().await?;
            let value = body.node.value.ok_or_else(|| KvError::Decode {
                key: key.to_string(),
                reason: "node has no value".to_string(),
            })?;
            Ok(KvNode {
                key: body.node.key,
                value,
                modified_index: body.node.modified_index,
            })
        } else {
            let err: ErrorBody = response.json().await.map_err(|e| KvError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            Err(match err.error_code {
                CODE_NOT_FOUND => KvError::NotFound {
                    key: key.to_string(),
                },
                CODE_COMPARE_FAILED => KvError::CasConflict {
                    key: key.to_string(),
                    index: err.index,
                },
                CODE_ALREADY_EXISTS => KvError::AlreadyExists {
                    key: key.to_string(),
                },
                code => KvError::Backend {
                    code,
                    message: err.message,
                },
            })
        }
    }
}

#[async_trait]
impl KvStore for EtcdClient {
    async fn get(&self, key: &str) -> Result<KvNode, KvError> {
        let response = self.client.get(self.key_url(key)).send().await?;
        Self::decode(key, response).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<KvNode, KvError> {
        let response = self
            .client
            .put(self.key_url(key))
            .form(&[("value", value)])
            .send()
            .await?;
        Self::decode(key, response).await
    }

    async fn create(&self, key: &str, value: &str) -> Result<KvNode, KvError> {
        let response = self
            .client
            .put(self.key_url(key))
            .query(&[("prevExist", "false")])
            .form(&[("value", value)])
            .send()
            .await?;
        Self::decode(key, response).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<KvNode, KvError> {
        let response = self
            .client
            .put(self.key_url(key))
            .query(&[("prevValue", expected)])
            .form(&[("value", new)])
            .send()
            .await?;
        Self::decode(key, response).await
    }

    async fn watch(&self, key: &str, since_index: u64) -> Result<KvNode, KvError> {
        debug!(key, since_index, "watching key");
        loop {
            let result = self
                .client
                .get(self.key_url(key))
                .query(&[
                    ("wait", "true".to_string()),
                    ("waitIndex", since_index.to_string()),
                ])
                .timeout(WATCH_POLL_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(response) => return Self::decode(key, response).await,
                // Quiet poll round, re-arm the watch.
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/version", self.base_url);
        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: NodeBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeBody {
    key: String,
    #[serde(default)]
    value: Option<String>,
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: u64,
    message: String,
    #[serde(default)]
    index: u64,
}

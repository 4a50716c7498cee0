//! Daemon API client.
//!
//! Talks to the local rebootd control API. Mutating calls attach the
//! bearer token the daemon writes under its state directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the rebootd control API.
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
    token_path: PathBuf,
}

impl DaemonClient {
    /// Build a client from the environment, with the daemon's defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("REBOOTD_URL").unwrap_or_else(|_| "http://127.0.0.1:7421".to_string());
        let state_dir = std::env::var("REBOOTD_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/run/rebootd"));

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url,
            token_path: state_dir.join("token"),
        }
    }

    fn token(&self) -> Result<String, CliError> {
        let raw = fs::read_to_string(&self.token_path)
            .map_err(|_| CliError::NotAuthorized(self.token_path.display().to_string()))?;
        Ok(raw.trim().to_string())
    }

    /// Whether the daemon answers its ping endpoint.
    pub async fn is_alive(&self) -> bool {
        let url = format!("{}/v1/ping", self.base_url);
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, CliError> {
        self.get("/v1/status").await
    }

    pub async fn full_status(&self) -> Result<FullStatusResponse, CliError> {
        self.get("/v1/full-status").await
    }

    pub async fn reboot(&self, method: &str, force: bool) -> Result<RebootResponse, CliError> {
        self.send(
            reqwest::Method::POST,
            "/v1/reboot",
            &serde_json::json!({ "method": method, "force": force }),
        )
        .await
    }

    pub async fn cancel(&self) -> Result<SuccessResponse, CliError> {
        self.send(reqwest::Method::POST, "/v1/cancel", &serde_json::json!({}))
            .await
    }

    pub async fn set_strategy(&self, strategy: &str) -> Result<SuccessResponse, CliError> {
        self.send(
            reqwest::Method::PUT,
            "/v1/strategy",
            &serde_json::json!({ "strategy": strategy }),
        )
        .await
    }

    pub async fn set_window(
        &self,
        start: &str,
        duration: &str,
    ) -> Result<SuccessResponse, CliError> {
        self.send(
            reqwest::Method::PUT,
            "/v1/window",
            &serde_json::json!({ "start": start, "duration": duration }),
        )
        .await
    }

    pub async fn set_active(&self, active: bool) -> Result<SuccessResponse, CliError> {
        self.send(
            reqwest::Method::PUT,
            "/v1/active",
            &serde_json::json!({ "active": active }),
        )
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, CliError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .request(method, url)
            .bearer_auth(self.token()?)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        Err(CliError::Api {
            code: body.error,
            message: body.message,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub requested_method: Option<String>,
    pub reboot_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FullStatusResponse {
    pub status: String,
    pub strategy: String,
    pub requested_method: Option<String>,
    pub reboot_time: Option<String>,
    pub window_start: Option<String>,
    pub window_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RebootResponse {
    pub method: String,
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

impl Default for ApiErrorBody {
    fn default() -> Self {
        Self {
            error: "InternalError".to_string(),
            message: "the daemon answered with an unreadable error".to_string(),
        }
    }
}

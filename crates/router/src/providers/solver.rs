use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Solver reports no available capacity")]
    NoCapacity,

    #[error("Solver returned malformed output: {0}")]
    Malformed(String),

    #[error("Solver transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverResponse {
    pub token: String,
}

/// External, paid solving service. Opaque: the engine only sees tokens and
/// capacity errors.
#[async_trait]
pub trait SolverClient: Send + Sync {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<SolverResponse, SolverError>;
}

/// HTTP client for a 2captcha-style solving API.
pub struct HttpSolverClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSolverClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl SolverClient for HttpSolverClient {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<SolverResponse, SolverError> {
        let url = format!("{}/solve", self.base_url);
        let body = json!({
            "key": self.api_key,
            "sitekey": site_key,
            "pageurl": page_url,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SolverError::Transport(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(SolverError::NoCapacity);
        }
        if !response.status().is_success() {
            return Err(SolverError::Transport(format!(
                "status {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SolverError::Malformed(e.to_string()))?;

        match payload.get("status").and_then(serde_json::Value::as_str) {
            Some("ok") => {}
            Some("no_capacity") => return Err(SolverError::NoCapacity),
            Some(other) => return Err(SolverError::Malformed(format!("status '{}'", other))),
            None => return Err(SolverError::Malformed("missing 'status'".to_string())),
        }

        let token = payload
            .get("token")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        if token.is_empty() {
            return Err(SolverError::Malformed("empty token".to_string()));
        }

        Ok(SolverResponse {
            token: token.to_string(),
        })
    }
}

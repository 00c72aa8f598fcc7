use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use continuum_core::{
    CapabilityProvider, CapabilityRequest, CostTier, EnvSnapshot, ProviderOutcome,
};

use crate::providers::browser::{BrowserBackend, BrowserCommand};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// A web search backend. Backends are interchangeable; which one runs, and
/// in what fallback order, is decided purely by chain configuration.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Value, SearchError>;
}

/// DuckDuckGo instant-answer backend over plain HTTP.
pub struct DuckDuckGoBackend {
    client: Client,
    base_url: String,
}

impl DuckDuckGoBackend {
    pub fn new() -> Self {
        Self::with_base_url("https://api.duckduckgo.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

impl Default for DuckDuckGoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        "search-ddg"
    }

    async fn search(&self, query: &str) -> Result<Value, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| SearchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Http(format!("status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(summarize_instant_answer(&body))
    }
}

/// Extract the abstract and top related topics from an instant-answer
/// response.
fn summarize_instant_answer(body: &Value) -> Value {
    let abstract_text = body
        .get("AbstractText")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let results: Vec<String> = body
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(|t| t.get("Text").and_then(Value::as_str))
                .take(3)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    json!({
        "abstract": abstract_text,
        "results": results,
    })
}

/// Search via the browser backend: fetches the same instant-answer API
/// through a page load and reads the body text. The fallback path when the
/// direct HTTP backend is down or blocked.
pub struct BrowserSearchBackend {
    backend: Arc<dyn BrowserBackend>,
    base_url: String,
}

impl BrowserSearchBackend {
    pub fn new(backend: Arc<dyn BrowserBackend>) -> Self {
        Self {
            backend,
            base_url: "https://api.duckduckgo.com".to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for BrowserSearchBackend {
    fn name(&self) -> &str {
        "search-browser"
    }

    async fn search(&self, query: &str) -> Result<Value, SearchError> {
        let url = format!(
            "{}/?q={}&format=json&no_html=1",
            self.base_url,
            urlencode(query)
        );

        self.backend
            .execute(&BrowserCommand::Navigate { url })
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let text = self
            .backend
            .execute(&BrowserCommand::Evaluate {
                script: "document.body.innerText".to_string(),
            })
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let raw = text.as_str().unwrap_or_default();
        let body: Value =
            serde_json::from_str(raw).map_err(|e| SearchError::Parse(e.to_string()))?;

        Ok(summarize_instant_answer(&body))
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Capability provider wrapping one search backend.
pub struct SearchProvider {
    backend: Arc<dyn SearchBackend>,
    tier: CostTier,
}

impl SearchProvider {
    pub fn new(backend: Arc<dyn SearchBackend>, tier: CostTier) -> Self {
        Self { backend, tier }
    }
}

#[async_trait]
impl CapabilityProvider for SearchProvider {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn cost_tier(&self) -> CostTier {
        self.tier
    }

    fn precondition(&self, _request: &CapabilityRequest, _env: &EnvSnapshot) -> bool {
        true
    }

    async fn invoke(&self, request: &CapabilityRequest, _env: &EnvSnapshot) -> ProviderOutcome {
        let query = match request.param_str("query") {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ProviderOutcome::HardFailure("missing 'query' parameter".to_string()),
        };

        match self.backend.search(query).await {
            Ok(value) => ProviderOutcome::Success(value),
            Err(e) => ProviderOutcome::SoftFailure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_takes_abstract_and_top_three() {
        let body = json!({
            "AbstractText": "Rust is a systems language.",
            "RelatedTopics": [
                {"Text": "one"},
                {"Text": "two"},
                {"NoText": true},
                {"Text": "three"},
                {"Text": "four"},
            ]
        });

        let summary = summarize_instant_answer(&body);
        assert_eq!(summary["abstract"], "Rust is a systems language.");
        assert_eq!(summary["results"], json!(["one", "two", "three"]));
    }

    #[test]
    fn test_summarize_handles_missing_fields() {
        let summary = summarize_instant_answer(&json!({}));
        assert_eq!(summary["abstract"], "");
        assert_eq!(summary["results"], json!([]));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("rust language"), "rust+language");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
    }
}

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

use continuum_core::{
    CapabilityProvider, CapabilityRequest, CostTier, DetectionSignals, EnvSnapshot, ProviderOutcome,
};

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Browser backend unavailable: {0}")]
    Unavailable(String),
}

/// One page interaction, parsed from request parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserCommand {
    Navigate { url: String },
    Click { selector: String },
    Fill { selector: String, value: String },
    Screenshot,
    Evaluate { script: String },
    Scroll { direction: String },
}

impl BrowserCommand {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, String> {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing 'action' parameter".to_string())?;

        let get = |key: &str| -> Result<String, String> {
            params
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("action '{}' requires '{}'", action, key))
        };

        match action {
            "navigate" => Ok(BrowserCommand::Navigate { url: get("url")? }),
            "click" => Ok(BrowserCommand::Click {
                selector: get("selector")?,
            }),
            "fill" => Ok(BrowserCommand::Fill {
                selector: get("selector")?,
                value: get("value")?,
            }),
            "screenshot" => Ok(BrowserCommand::Screenshot),
            "evaluate" => Ok(BrowserCommand::Evaluate {
                script: get("value")?,
            }),
            "scroll" => Ok(BrowserCommand::Scroll {
                direction: get("value")?,
            }),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// The interaction profile a backend presents to a page: fingerprint
/// surface plus human-like timing. Data, not behavior; the backend decides
/// how to apply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub accept_language: String,
    pub jitter_ms: (u64, u64),
}

impl InteractionProfile {
    /// The normalized profile used when automation signals must be masked.
    pub fn stealth() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .to_string(),
            viewport: (1920, 1080),
            accept_language: "en-US,en;q=0.9".to_string(),
            jitter_ms: (40, 220),
        }
    }

    /// A randomized pause inside the configured jitter bounds.
    pub fn jittered_delay(&self) -> Duration {
        let (lo, hi) = self.jitter_ms;
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        let ms = rand::thread_rng().gen_range(lo..=hi);
        Duration::from_millis(ms)
    }
}

/// Pluggable browser automation backend.
///
/// Page rendering lives entirely behind this trait; the engine only cares
/// about outcomes and detection signals.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn apply_profile(&self, profile: &InteractionProfile) -> Result<(), BrowserError>;

    async fn execute(&self, command: &BrowserCommand) -> Result<Value, BrowserError>;

    /// Re-probe the page for automation-detection signals.
    async fn probe_detection(&self) -> Result<DetectionSignals, BrowserError>;

    /// Attempt the challenge interaction once. `None` means the challenge
    /// did not clear this time.
    async fn solve_challenge(
        &self,
        site_key: &str,
        page_url: &str,
    ) -> Result<Option<String>, BrowserError>;
}

/// Capability provider for direct browser actions.
pub struct BrowserActionProvider {
    backend: Arc<dyn BrowserBackend>,
}

impl BrowserActionProvider {
    pub fn new(backend: Arc<dyn BrowserBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CapabilityProvider for BrowserActionProvider {
    fn name(&self) -> &str {
        "browser"
    }

    fn cost_tier(&self) -> CostTier {
        CostTier::Free
    }

    fn precondition(&self, _request: &CapabilityRequest, _env: &EnvSnapshot) -> bool {
        true
    }

    async fn invoke(&self, request: &CapabilityRequest, _env: &EnvSnapshot) -> ProviderOutcome {
        let command = match BrowserCommand::from_params(&request.params) {
            Ok(command) => command,
            // Malformed input is not retryable by a different provider.
            Err(reason) => return ProviderOutcome::HardFailure(reason),
        };

        match self.backend.execute(&command).await {
            Ok(value) => ProviderOutcome::Success(value),
            Err(e) => ProviderOutcome::SoftFailure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn test_parse_navigate() {
        let cmd = BrowserCommand::from_params(&params(&[
            ("action", "navigate"),
            ("url", "https://example.com"),
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            BrowserCommand::Navigate {
                url: "https://example.com".to_string()
            }
        );
    }

    #[test]
    fn test_parse_fill_requires_selector_and_value() {
        let err = BrowserCommand::from_params(&params(&[("action", "fill"), ("value", "x")]))
            .unwrap_err();
        assert!(err.contains("selector"));
    }

    #[test]
    fn test_parse_unknown_action() {
        let err = BrowserCommand::from_params(&params(&[("action", "teleport")])).unwrap_err();
        assert!(err.contains("teleport"));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let profile = InteractionProfile::stealth();
        for _ in 0..50 {
            let d = profile.jittered_delay().as_millis() as u64;
            assert!(d >= profile.jitter_ms.0 && d <= profile.jitter_ms.1);
        }
    }
}

//! The CAPTCHA resolution ladder: three strategies with strict ordering and
//! distinct preconditions. A later, costlier rung only runs after the
//! previous one definitively declined or soft-failed, and an abandoned rung
//! is never retried within the same request.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use continuum_core::{
    CapabilityKind, CapabilityProvider, CapabilityRequest, CostTier, EnvSnapshot, ProviderOutcome,
};

use crate::providers::browser::{BrowserBackend, InteractionProfile};
use crate::providers::solver::{SolverClient, SolverError};
use crate::router::ProviderChain;

/// A parsed challenge. Both fields are required; anything less is malformed
/// input.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptchaChallenge {
    pub site_key: String,
    pub page_url: String,
}

impl CaptchaChallenge {
    pub fn from_request(request: &CapabilityRequest) -> Result<Self, String> {
        let site_key = request
            .param_str("site_key")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'site_key' parameter".to_string())?;
        let page_url = request
            .param_str("page_url")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing 'page_url' parameter".to_string())?;

        Ok(Self {
            site_key: site_key.to_string(),
            page_url: page_url.to_string(),
        })
    }
}

/// Rung 1: direct response injection for known test site keys.
///
/// The precondition is an exact byte-for-byte membership check against the
/// configured test-key set. No prefix matching, no heuristics: this path
/// must never fire against a production challenge.
pub struct TestKeyShortCircuit;

#[async_trait]
impl CapabilityProvider for TestKeyShortCircuit {
    fn name(&self) -> &str {
        "captcha-test-key"
    }

    fn cost_tier(&self) -> CostTier {
        CostTier::Free
    }

    fn precondition(&self, request: &CapabilityRequest, env: &EnvSnapshot) -> bool {
        match CaptchaChallenge::from_request(request) {
            Ok(challenge) => env.known_test_keys.iter().any(|k| *k == challenge.site_key),
            Err(_) => false,
        }
    }

    async fn invoke(&self, request: &CapabilityRequest, _env: &EnvSnapshot) -> ProviderOutcome {
        let challenge = match CaptchaChallenge::from_request(request) {
            Ok(challenge) => challenge,
            Err(reason) => return ProviderOutcome::HardFailure(reason),
        };

        debug!(site_key = %challenge.site_key, "known test key, injecting response");
        ProviderOutcome::Success(json!({
            "strategy": "test-key",
            "token": format!("test-response:{}", challenge.site_key),
        }))
    }
}

/// Rung 2: behavioral evasion through the browser backend.
///
/// Applicable only while automation-detection signals are present. Each
/// attempt applies the stealth profile with fresh timing jitter and retries
/// the challenge interaction; the attempt count is capped.
pub struct BehavioralEvasion {
    backend: Arc<dyn BrowserBackend>,
    profile: InteractionProfile,
    max_attempts: usize,
}

impl BehavioralEvasion {
    pub fn new(backend: Arc<dyn BrowserBackend>, max_attempts: usize) -> Self {
        Self {
            backend,
            profile: InteractionProfile::stealth(),
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl CapabilityProvider for BehavioralEvasion {
    fn name(&self) -> &str {
        "captcha-evasion"
    }

    fn cost_tier(&self) -> CostTier {
        CostTier::Metered
    }

    fn precondition(&self, request: &CapabilityRequest, env: &EnvSnapshot) -> bool {
        CaptchaChallenge::from_request(request).is_ok() && env.detection.automation_visible()
    }

    async fn invoke(&self, request: &CapabilityRequest, _env: &EnvSnapshot) -> ProviderOutcome {
        let challenge = match CaptchaChallenge::from_request(request) {
            Ok(challenge) => challenge,
            Err(reason) => return ProviderOutcome::HardFailure(reason),
        };

        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.profile.jittered_delay()).await;

            if let Err(e) = self.backend.apply_profile(&self.profile).await {
                return ProviderOutcome::SoftFailure(e.to_string());
            }

            match self
                .backend
                .solve_challenge(&challenge.site_key, &challenge.page_url)
                .await
            {
                Ok(Some(token)) => {
                    return ProviderOutcome::Success(json!({
                        "strategy": "behavioral-evasion",
                        "token": token,
                        "attempts": attempt,
                    }))
                }
                Ok(None) => {}
                Err(e) => return ProviderOutcome::SoftFailure(e.to_string()),
            }

            match self.backend.probe_detection().await {
                Ok(signals) if signals.automation_visible() => {
                    debug!(attempt, "detection signals persist");
                }
                Ok(_) => debug!(attempt, "signals clear, challenge still unsolved"),
                Err(e) => return ProviderOutcome::SoftFailure(e.to_string()),
            }
        }

        warn!(
            attempts = self.max_attempts,
            "evasion cap reached without clearing the challenge"
        );
        ProviderOutcome::SoftFailure(format!(
            "challenge not cleared after {} attempts",
            self.max_attempts
        ))
    }
}

/// Rung 3: the external solving service. Last resort, unconditionally
/// applicable.
pub struct SolverService {
    client: Arc<dyn SolverClient>,
}

impl SolverService {
    pub fn new(client: Arc<dyn SolverClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityProvider for SolverService {
    fn name(&self) -> &str {
        "captcha-solver"
    }

    fn cost_tier(&self) -> CostTier {
        CostTier::Paid
    }

    fn precondition(&self, _request: &CapabilityRequest, _env: &EnvSnapshot) -> bool {
        true
    }

    async fn invoke(&self, request: &CapabilityRequest, _env: &EnvSnapshot) -> ProviderOutcome {
        let challenge = match CaptchaChallenge::from_request(request) {
            Ok(challenge) => challenge,
            Err(reason) => {
                return ProviderOutcome::HardFailure(format!("malformed challenge: {}", reason))
            }
        };

        match self
            .client
            .solve(&challenge.site_key, &challenge.page_url)
            .await
        {
            Ok(response) if response.token.is_empty() => {
                ProviderOutcome::HardFailure("solver returned an empty token".to_string())
            }
            Ok(response) => ProviderOutcome::Success(json!({
                "strategy": "solver-service",
                "token": response.token,
            })),
            Err(e @ SolverError::NoCapacity) => ProviderOutcome::HardFailure(e.to_string()),
            Err(e @ SolverError::Malformed(_)) => ProviderOutcome::HardFailure(e.to_string()),
            Err(e @ SolverError::Transport(_)) => ProviderOutcome::SoftFailure(e.to_string()),
        }
    }
}

/// Build the fixed ladder. Order here is the fallback order, full stop.
pub fn captcha_chain(
    backend: Arc<dyn BrowserBackend>,
    solver: Arc<dyn SolverClient>,
    evasion_attempt_cap: usize,
) -> ProviderChain {
    ProviderChain::new(
        CapabilityKind::CaptchaResolve,
        vec![
            Arc::new(TestKeyShortCircuit),
            Arc::new(BehavioralEvasion::new(backend, evasion_attempt_cap)),
            Arc::new(SolverService::new(solver)),
        ],
    )
}

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use continuum_core::{CapabilityKind, CapabilityProvider, CapabilityRequest, EnvSnapshot, ProviderOutcome};

use crate::error::{Attempt, AttemptDisposition, DispatchError};

/// Cooperative cancellation for an in-flight dispatch.
///
/// Checked between provider attempts only; a provider already running is
/// not interrupted. Either way no state commit happens for a cancelled
/// dispatch, because the result never reaches the store.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed, ordered list of alternative providers for one capability kind.
/// Ordering is set here and never changes at runtime.
pub struct ProviderChain {
    kind: CapabilityKind,
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl ProviderChain {
    pub fn new(kind: CapabilityKind, providers: Vec<Arc<dyn CapabilityProvider>>) -> Self {
        Self { kind, providers }
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn providers(&self) -> &[Arc<dyn CapabilityProvider>] {
        &self.providers
    }
}

/// A chain walk that ended in success.
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    pub provider: String,
    pub value: Value,
}

/// Routes a request to the chain registered for its kind and walks the
/// chain in fixed order.
pub struct CapabilityRouter {
    chains: HashMap<CapabilityKind, ProviderChain>,
    provider_timeout: Duration,
}

impl CapabilityRouter {
    pub fn new(provider_timeout: Duration) -> Self {
        Self {
            chains: HashMap::new(),
            provider_timeout,
        }
    }

    /// Register a chain. Configuration time only; replaces any previous
    /// chain for the same kind.
    pub fn register(&mut self, chain: ProviderChain) {
        self.chains.insert(chain.kind(), chain);
    }

    pub async fn dispatch(
        &self,
        request: &CapabilityRequest,
        env: &EnvSnapshot,
        cancel: &CancelFlag,
    ) -> Result<ChainSuccess, DispatchError> {
        let chain = self
            .chains
            .get(&request.kind)
            .ok_or(DispatchError::UnknownCapability(request.kind))?;

        info!(request = %request.id, kind = %request.kind, "dispatching");

        let mut attempts: Vec<Attempt> = Vec::new();

        for provider in chain.providers() {
            let name = provider.name().to_string();

            if cancel.is_cancelled() {
                info!(request = %request.id, provider = %name, "dispatch cancelled");
                return Err(DispatchError::Cancelled {
                    next_provider: name,
                });
            }

            if !provider.precondition(request, env) {
                debug!(provider = %name, "precondition false, skipping");
                attempts.push(Attempt {
                    provider: name,
                    disposition: AttemptDisposition::Skipped,
                });
                continue;
            }

            info!(provider = %name, cost_tier = ?provider.cost_tier(), "invoking provider");

            let outcome = match timeout(self.provider_timeout, provider.invoke(request, env)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(provider = %name, "provider timed out");
                    ProviderOutcome::SoftFailure(format!(
                        "timed out after {}ms",
                        self.provider_timeout.as_millis()
                    ))
                }
            };

            match outcome {
                ProviderOutcome::Success(value) => {
                    info!(request = %request.id, provider = %name, "dispatch succeeded");
                    return Ok(ChainSuccess {
                        provider: name,
                        value,
                    });
                }
                ProviderOutcome::SoftFailure(reason) => {
                    warn!(provider = %name, reason = %reason, "soft failure, falling through");
                    attempts.push(Attempt {
                        provider: name,
                        disposition: AttemptDisposition::SoftFailed(reason),
                    });
                }
                ProviderOutcome::HardFailure(reason) => {
                    error!(provider = %name, reason = %reason, "hard failure, aborting chain");
                    return Err(DispatchError::ProviderHardFailure {
                        provider: name,
                        reason,
                    });
                }
            }
        }

        warn!(request = %request.id, kind = %request.kind, "chain exhausted");
        Err(DispatchError::ChainExhausted {
            kind: request.kind,
            attempts,
        })
    }
}

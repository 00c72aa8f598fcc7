use async_trait::async_trait;

use crate::types::{CapabilityRequest, CostTier, EnvSnapshot, ProviderOutcome};

/// One way of satisfying a capability request.
///
/// Any search backend, browser-automation backend, or solving service is
/// plugged in through this interface; the router never branches on provider
/// identity.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn cost_tier(&self) -> CostTier;

    /// Whether this provider applies to the request in the current
    /// environment. A false return skips the provider without counting as a
    /// failure.
    fn precondition(&self, request: &CapabilityRequest, env: &EnvSnapshot) -> bool;

    async fn invoke(&self, request: &CapabilityRequest, env: &EnvSnapshot) -> ProviderOutcome;
}

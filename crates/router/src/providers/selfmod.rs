use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Component, Path};
use std::sync::Arc;
use thiserror::Error;

use continuum_core::{
    CapabilityProvider, CapabilityRequest, CostTier, EnvSnapshot, ProviderOutcome,
};

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Change applier unavailable: {0}")]
    Unavailable(String),

    #[error("Change application failed: {0}")]
    Failed(String),
}

/// A proposed change to the agent's own code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlan {
    pub target: String,
    pub patch: String,
    pub summary: String,
    pub new_version_tag: String,
}

impl ChangePlan {
    /// Structural validation. Anything wrong here is malformed input, not a
    /// transient condition.
    pub fn validate(&self, workspace_root: &Path) -> Result<(), String> {
        let target = Path::new(&self.target);
        if target.is_absolute() {
            return Err(format!("target '{}' must be workspace-relative", self.target));
        }
        if target
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("target '{}' escapes the workspace", self.target));
        }
        if !workspace_root.join(target).starts_with(workspace_root) {
            return Err(format!("target '{}' escapes the workspace", self.target));
        }
        if self.patch.trim().is_empty() {
            return Err("patch is empty".to_string());
        }
        if self.new_version_tag.trim().is_empty() {
            return Err("new version tag is empty".to_string());
        }
        Ok(())
    }
}

/// Applies a validated change plan. The actual editing, branching, and
/// review flow live behind this trait.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(&self, plan: &ChangePlan) -> Result<Value, ApplyError>;
}

/// Capability provider for self-modification requests.
pub struct SelfModifyProvider {
    applier: Arc<dyn ChangeApplier>,
}

impl SelfModifyProvider {
    pub fn new(applier: Arc<dyn ChangeApplier>) -> Self {
        Self { applier }
    }
}

#[async_trait]
impl CapabilityProvider for SelfModifyProvider {
    fn name(&self) -> &str {
        "self-modify"
    }

    fn cost_tier(&self) -> CostTier {
        CostTier::Free
    }

    fn precondition(&self, _request: &CapabilityRequest, _env: &EnvSnapshot) -> bool {
        true
    }

    async fn invoke(&self, request: &CapabilityRequest, env: &EnvSnapshot) -> ProviderOutcome {
        let plan: ChangePlan = match serde_json::from_value(Value::Object(request.params.clone())) {
            Ok(plan) => plan,
            Err(e) => {
                return ProviderOutcome::HardFailure(format!("malformed change plan: {}", e))
            }
        };

        if let Err(reason) = plan.validate(&env.workspace_root) {
            return ProviderOutcome::HardFailure(format!("invalid change plan: {}", reason));
        }

        match self.applier.apply(&plan).await {
            Ok(detail) => ProviderOutcome::Success(json!({
                "applied": true,
                "target": plan.target,
                "summary": plan.summary,
                "version_tag": plan.new_version_tag,
                "detail": detail,
            })),
            Err(ApplyError::Unavailable(reason)) => ProviderOutcome::SoftFailure(reason),
            Err(ApplyError::Failed(reason)) => ProviderOutcome::HardFailure(reason),
        }
    }
}

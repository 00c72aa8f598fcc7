//! Shared types and interfaces for the continuum engine.

pub mod traits;
pub mod types;

pub use traits::CapabilityProvider;
pub use types::{
    CapabilityKind, CapabilityRequest, CostTier, DetectionSignals, DispatchResult, EnvSnapshot,
    ProviderOutcome,
};

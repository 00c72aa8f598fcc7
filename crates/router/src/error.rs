use continuum_core::CapabilityKind;
use thiserror::Error;

/// How a provider was disposed of during a chain walk.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptDisposition {
    Skipped,
    SoftFailed(String),
}

/// One entry in the trail a failed chain reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub provider: String,
    pub disposition: AttemptDisposition,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No provider chain registered for capability '{0}'")]
    UnknownCapability(CapabilityKind),

    #[error("Provider chain exhausted for '{kind}': {}", describe(.attempts))]
    ChainExhausted {
        kind: CapabilityKind,
        attempts: Vec<Attempt>,
    },

    #[error("Provider '{provider}' failed hard: {reason}")]
    ProviderHardFailure { provider: String, reason: String },

    #[error("Dispatch cancelled before provider '{next_provider}'")]
    Cancelled { next_provider: String },
}

fn describe(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no providers in chain".to_string();
    }
    attempts
        .iter()
        .map(|a| match &a.disposition {
            AttemptDisposition::Skipped => format!("{} (skipped)", a.provider),
            AttemptDisposition::SoftFailed(reason) => format!("{} ({})", a.provider, reason),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

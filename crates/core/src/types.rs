use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Request categories the engine knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    Search,
    BrowserAction,
    CaptchaResolve,
    SelfModify,
}

impl CapabilityKind {
    /// Whether a successful dispatch of this kind must be recorded as a
    /// state snapshot. Read-only searches leave no trace in the chain.
    pub fn is_state_relevant(&self) -> bool {
        !matches!(self, CapabilityKind::Search)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityKind::Search => "search",
            CapabilityKind::BrowserAction => "browser-action",
            CapabilityKind::CaptchaResolve => "captcha-resolve",
            CapabilityKind::SelfModify => "self-modify",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CapabilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(CapabilityKind::Search),
            "browser-action" => Ok(CapabilityKind::BrowserAction),
            "captcha-resolve" => Ok(CapabilityKind::CaptchaResolve),
            "self-modify" => Ok(CapabilityKind::SelfModify),
            other => Err(format!("Unknown capability kind: {}", other)),
        }
    }
}

/// A directive entering the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub id: String,
    pub kind: CapabilityKind,
    pub params: Map<String, Value>,
    pub priority: u8,
}

impl CapabilityRequest {
    pub fn new(kind: CapabilityKind, params: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            params,
            priority: 5,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// What a single provider reported back.
///
/// A soft failure lets the chain fall through to the next provider; a hard
/// failure aborts the chain immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success(Value),
    SoftFailure(String),
    HardFailure(String),
}

/// Relative expense of invoking a provider. Chains are ordered so cheaper
/// providers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Metered,
    Paid,
}

/// Automation-detection signals observed in the environment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectionSignals {
    pub webdriver_exposed: bool,
    pub non_human_timing: bool,
}

impl DetectionSignals {
    pub fn automation_visible(&self) -> bool {
        self.webdriver_exposed || self.non_human_timing
    }
}

/// Immutable view of the environment a dispatch runs against.
///
/// Chains read this; nothing in the dispatch path mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub known_test_keys: Vec<String>,
    pub detection: DetectionSignals,
    pub workspace_root: PathBuf,
}

impl EnvSnapshot {
    pub fn new(known_test_keys: Vec<String>, workspace_root: PathBuf) -> Self {
        Self {
            known_test_keys,
            detection: DetectionSignals::default(),
            workspace_root,
        }
    }

    pub fn with_detection(mut self, detection: DetectionSignals) -> Self {
        self.detection = detection;
        self
    }
}

/// Structured outcome handed to the operator channel for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub request_id: String,
    pub kind: CapabilityKind,
    pub provider: String,
    pub output: Value,
    pub snapshot_ref: Option<u64>,
}

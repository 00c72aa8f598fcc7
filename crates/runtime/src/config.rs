use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Runtime configuration. Chain composition lives here, not in code:
/// provider order is data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub state_log: PathBuf,
    pub manifest: PathBuf,
    pub displayed_version: String,
    pub workspace_root: PathBuf,

    /// Identity facts seeded into the first snapshot.
    #[serde(default)]
    pub identity: Map<String, Value>,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub captcha: CaptchaConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    #[serde(default = "default_append_retry_cap")]
    pub append_retry_cap: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
            append_retry_cap: default_append_retry_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default)]
    pub known_test_keys: Vec<String>,

    #[serde(default = "default_evasion_attempt_cap")]
    pub evasion_attempt_cap: usize,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            known_test_keys: Vec::new(),
            evasion_attempt_cap: default_evasion_attempt_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fallback order of search backends, by name. Swapping backends is a
    /// config edit, never a code change.
    #[serde(default = "default_search_order")]
    pub backend_order: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend_order: default_search_order(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_solver_url")]
    pub base_url: String,

    /// Name of the environment variable holding the solver API key.
    #[serde(default = "default_solver_key_env")]
    pub api_key_env: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_solver_url(),
            api_key_env: default_solver_key_env(),
        }
    }
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

fn default_append_retry_cap() -> usize {
    3
}

fn default_evasion_attempt_cap() -> usize {
    3
}

fn default_search_order() -> Vec<String> {
    vec!["search-ddg".to_string(), "search-browser".to_string()]
}

fn default_solver_url() -> String {
    "https://solver.invalid".to_string()
}

fn default_solver_key_env() -> String {
    "CONTINUUM_SOLVER_KEY".to_string()
}

impl RuntimeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }
}

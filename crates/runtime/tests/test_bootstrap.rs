use async_trait::async_trait;
use continuum_core::DetectionSignals;
use continuum_router::providers::browser::{
    BrowserBackend, BrowserCommand, BrowserError, InteractionProfile,
};
use continuum_router::providers::selfmod::{ApplyError, ChangeApplier, ChangePlan};
use continuum_runtime::{bootstrap, RuntimeConfig};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

struct NullBrowser;

#[async_trait]
impl BrowserBackend for NullBrowser {
    async fn apply_profile(&self, _: &InteractionProfile) -> Result<(), BrowserError> {
        Err(BrowserError::Unavailable("no browser attached".into()))
    }
    async fn execute(&self, _: &BrowserCommand) -> Result<Value, BrowserError> {
        Err(BrowserError::Unavailable("no browser attached".into()))
    }
    async fn probe_detection(&self) -> Result<DetectionSignals, BrowserError> {
        Err(BrowserError::Unavailable("no browser attached".into()))
    }
    async fn solve_challenge(&self, _: &str, _: &str) -> Result<Option<String>, BrowserError> {
        Err(BrowserError::Unavailable("no browser attached".into()))
    }
}

struct NullApplier;

#[async_trait]
impl ChangeApplier for NullApplier {
    async fn apply(&self, _: &ChangePlan) -> Result<Value, ApplyError> {
        Err(ApplyError::Unavailable("no applier attached".into()))
    }
}

fn config_in(temp: &TempDir) -> RuntimeConfig {
    let mut identity = Map::new();
    identity.insert("name".to_string(), json!("continuum"));
    identity.insert("purpose".to_string(), json!("personal agent"));

    let raw = format!(
        r#"
            state_log = "{0}/state.jsonl"
            manifest = "{0}/VERSION"
            displayed_version = "6.3.2"
            workspace_root = "{0}"
        "#,
        temp.path().display()
    );
    let mut config: RuntimeConfig = toml::from_str(&raw).unwrap();
    config.identity = identity;
    config
}

fn write_manifest(temp: &TempDir, tag: &str) {
    std::fs::write(temp.path().join("VERSION"), format!("{}\n", tag)).unwrap();
}

#[test]
fn test_bootstrap_seeds_empty_store() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");

    let engine = bootstrap(&config_in(&temp), Arc::new(NullBrowser), Arc::new(NullApplier)).unwrap();

    let head = engine.store().head().unwrap();
    assert_eq!(head.sequence(), 0);
    assert_eq!(head.version_tag(), "6.3.2");
    assert_eq!(head.payload()["name"], json!("continuum"));
}

#[test]
fn test_bootstrap_resumes_without_reseeding() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");
    let config = config_in(&temp);

    {
        bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier)).unwrap();
    }

    // Second boot is the same identity, not a new one.
    let engine = bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier)).unwrap();
    assert_eq!(engine.store().head().unwrap().sequence(), 0);
}

#[test]
fn test_bootstrap_fails_without_manifest() {
    let temp = TempDir::new().unwrap();

    let result = bootstrap(&config_in(&temp), Arc::new(NullBrowser), Arc::new(NullApplier));
    assert!(result.is_err());
}

#[test]
fn test_bootstrap_rejects_label_out_of_sync_at_seed() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");
    let mut config = config_in(&temp);
    config.displayed_version = "9.9.9".to_string();

    let result = bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier));
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("desync"), "unexpected error: {}", err);
}

#[test]
fn test_bootstrap_rejects_manifest_drift_on_resume() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");
    let config = config_in(&temp);

    bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier)).unwrap();

    // The manifest moved while the agent was down.
    write_manifest(&temp, "6.4.0");

    let result = bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier));
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("version sync"), "unexpected error: {}", err);
}

#[test]
fn test_bootstrap_rejects_tampered_log() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");
    let config = config_in(&temp);

    bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier)).unwrap();

    let log_path = temp.path().join("state.jsonl");
    let content = std::fs::read_to_string(&log_path).unwrap();
    std::fs::write(&log_path, content.replace("continuum", "intruder")).unwrap();

    let result = bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier));
    assert!(result.is_err());
}

#[test]
fn test_bootstrap_rejects_unknown_search_backend() {
    let temp = TempDir::new().unwrap();
    write_manifest(&temp, "6.3.2");
    let mut config = config_in(&temp);
    config.search.backend_order = vec!["search-bing".to_string()];

    let result = bootstrap(&config, Arc::new(NullBrowser), Arc::new(NullApplier));
    let err = format!("{:#}", result.unwrap_err());
    assert!(err.contains("search-bing"), "unexpected error: {}", err);
}

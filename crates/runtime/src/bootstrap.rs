use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use continuum_core::{CapabilityKind, CostTier, EnvSnapshot};
use continuum_router::providers::browser::{BrowserActionProvider, BrowserBackend};
use continuum_router::providers::search::{
    BrowserSearchBackend, DuckDuckGoBackend, SearchBackend, SearchProvider,
};
use continuum_router::providers::selfmod::{ChangeApplier, SelfModifyProvider};
use continuum_router::providers::solver::HttpSolverClient;
use continuum_router::{captcha_chain, CapabilityRouter, ProviderChain};
use continuum_store::{
    ManifestReader, StateStore, StoreError, VersionGuard, VersionRecord, VersionSource,
};

use crate::config::RuntimeConfig;
use crate::engine::ContinuityEngine;

/// Build a running engine from configuration and the two injected external
/// collaborators (browser automation and the change applier).
///
/// Startup is where integrity is enforced: the snapshot chain is verified
/// line by line when the store opens, and the resumed head must agree with
/// the manifest and displayed label before any dispatch runs.
pub fn bootstrap(
    config: &RuntimeConfig,
    browser: Arc<dyn BrowserBackend>,
    applier: Arc<dyn ChangeApplier>,
) -> Result<ContinuityEngine> {
    let store = StateStore::open(&config.state_log).with_context(|| {
        format!("opening snapshot log at {}", config.state_log.display())
    })?;

    let manifest = ManifestReader::new(&config.manifest);
    let manifest_tag = manifest.current_tag().context("reading release manifest")?;

    let records = vec![
        VersionRecord::new(VersionSource::ReleaseManifest, manifest_tag.clone()),
        VersionRecord::new(VersionSource::DisplayedLabel, config.displayed_version.clone()),
    ];

    match store.head() {
        Ok(head) => {
            // Restart of an existing identity: the resumed state must be in
            // version sync before the engine accepts work.
            VersionGuard::validate(head.version_tag(), &records)
                .context("resumed snapshot is out of version sync")?;
            info!(
                sequence = head.sequence(),
                version = head.version_tag(),
                "resuming existing identity"
            );
        }
        Err(StoreError::EmptyHistory) => {
            let seed = store
                .seed(config.identity.clone(), &manifest_tag, &records)
                .context("seeding identity snapshot")?;
            info!(version = seed.version_tag(), "seeded new identity");
        }
        Err(e) => return Err(e).context("reading snapshot head"),
    }

    let env = EnvSnapshot::new(
        config.captcha.known_test_keys.clone(),
        config.workspace_root.clone(),
    );

    let solver = Arc::new(HttpSolverClient::new(
        config.solver.base_url.clone(),
        std::env::var(&config.solver.api_key_env).unwrap_or_default(),
    ));

    let mut router = CapabilityRouter::new(Duration::from_millis(
        config.dispatch.provider_timeout_ms,
    ));

    router.register(build_search_chain(config, Arc::clone(&browser))?);
    router.register(ProviderChain::new(
        CapabilityKind::BrowserAction,
        vec![Arc::new(BrowserActionProvider::new(Arc::clone(&browser)))],
    ));
    router.register(captcha_chain(
        browser,
        solver,
        config.captcha.evasion_attempt_cap,
    ));
    router.register(ProviderChain::new(
        CapabilityKind::SelfModify,
        vec![Arc::new(SelfModifyProvider::new(applier))],
    ));

    Ok(ContinuityEngine::new(
        router,
        store,
        manifest,
        config.displayed_version.clone(),
        env,
        config.dispatch.append_retry_cap,
    ))
}

/// Compose the search chain from the configured backend order. The router
/// never branches on backend identity; substitution happens right here.
fn build_search_chain(
    config: &RuntimeConfig,
    browser: Arc<dyn BrowserBackend>,
) -> Result<ProviderChain> {
    let mut providers: Vec<Arc<dyn continuum_core::CapabilityProvider>> = Vec::new();

    for name in &config.search.backend_order {
        let (backend, tier): (Arc<dyn SearchBackend>, CostTier) = match name.as_str() {
            "search-ddg" => (Arc::new(DuckDuckGoBackend::new()), CostTier::Free),
            "search-browser" => (
                Arc::new(BrowserSearchBackend::new(Arc::clone(&browser))),
                CostTier::Metered,
            ),
            other => bail!("unknown search backend '{}' in config", other),
        };
        providers.push(Arc::new(SearchProvider::new(backend, tier)));
    }

    if providers.is_empty() {
        bail!("search backend order is empty");
    }

    Ok(ProviderChain::new(CapabilityKind::Search, providers))
}

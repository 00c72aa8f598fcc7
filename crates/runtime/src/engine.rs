use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use continuum_core::{CapabilityRequest, DispatchResult, EnvSnapshot};
use continuum_router::{CancelFlag, CapabilityRouter, ChainSuccess, DispatchError};
use continuum_store::{
    ManifestError, ManifestReader, StateStore, StoreError, VersionDesync, VersionRecord,
    VersionSource,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The provider already acted on the outside world, but the resulting
    /// snapshot failed version validation. The external effect is not
    /// rolled back; it is reported alongside the desync so the operator
    /// sees both.
    #[error("Action completed but the commit was rejected: {desync}")]
    CommitRejected { output: Value, desync: VersionDesync },
}

/// Connects the router to the store: a directive enters, a chain resolves
/// it, and the effect becomes a new committed snapshot or a loud failure.
pub struct ContinuityEngine {
    router: CapabilityRouter,
    store: StateStore,
    manifest: ManifestReader,
    displayed_version: String,
    env: EnvSnapshot,
    append_retry_cap: usize,
}

impl std::fmt::Debug for ContinuityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuityEngine")
            .field("displayed_version", &self.displayed_version)
            .field("append_retry_cap", &self.append_retry_cap)
            .finish_non_exhaustive()
    }
}

impl ContinuityEngine {
    pub fn new(
        router: CapabilityRouter,
        store: StateStore,
        manifest: ManifestReader,
        displayed_version: String,
        env: EnvSnapshot,
        append_retry_cap: usize,
    ) -> Self {
        Self {
            router,
            store,
            manifest,
            displayed_version,
            env,
            append_retry_cap,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Dispatch against the engine's base environment view.
    pub async fn handle(
        &self,
        request: &CapabilityRequest,
        cancel: &CancelFlag,
    ) -> Result<DispatchResult, EngineError> {
        let env = self.env.clone();
        self.handle_with_env(request, &env, cancel).await
    }

    /// Dispatch against a caller-refreshed environment view (e.g. after
    /// re-probing detection signals).
    pub async fn handle_with_env(
        &self,
        request: &CapabilityRequest,
        env: &EnvSnapshot,
        cancel: &CancelFlag,
    ) -> Result<DispatchResult, EngineError> {
        let success = self.router.dispatch(request, env, cancel).await?;

        if !request.kind.is_state_relevant() {
            debug!(request = %request.id, "state-irrelevant kind, nothing to commit");
            return Ok(DispatchResult {
                request_id: request.id.clone(),
                kind: request.kind,
                provider: success.provider,
                output: success.value,
                snapshot_ref: None,
            });
        }

        let sequence = self.commit(request, &success)?;
        Ok(DispatchResult {
            request_id: request.id.clone(),
            kind: request.kind,
            provider: success.provider,
            output: success.value,
            snapshot_ref: Some(sequence),
        })
    }

    /// Fold the completed effect into the head payload and append, retrying
    /// a bounded number of times when another append wins the race.
    fn commit(
        &self,
        request: &CapabilityRequest,
        success: &ChainSuccess,
    ) -> Result<u64, EngineError> {
        let records = vec![
            self.manifest.record()?,
            VersionRecord::new(VersionSource::DisplayedLabel, self.displayed_version.clone()),
        ];

        // A self-modification carries the version tag it claims to move the
        // agent to; everything else stays on the head's tag.
        let tag_override = success
            .value
            .get("version_tag")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut conflicts = 0;
        loop {
            let head = self.store.head().map_err(EngineError::Store)?;

            let mut payload = head.payload().clone();
            payload.insert(
                "last_action".to_string(),
                json!({
                    "request_id": request.id,
                    "kind": request.kind.to_string(),
                    "provider": success.provider,
                    "output_digest": output_digest(&success.value),
                    "completed_at": chrono::Utc::now().to_rfc3339(),
                }),
            );

            let tag = tag_override
                .clone()
                .unwrap_or_else(|| head.version_tag().to_string());

            match self.store.append(head.sequence(), payload, &tag, &records) {
                Ok(snapshot) => {
                    info!(
                        request = %request.id,
                        sequence = snapshot.sequence(),
                        "effect committed"
                    );
                    return Ok(snapshot.sequence());
                }
                Err(StoreError::ConcurrencyConflict { parent, head }) => {
                    if conflicts >= self.append_retry_cap {
                        return Err(EngineError::Store(StoreError::ConcurrencyConflict {
                            parent,
                            head,
                        }));
                    }
                    conflicts += 1;
                    warn!(conflicts, "append raced, retrying against refreshed head");
                }
                Err(StoreError::Desync(desync)) => {
                    error!(request = %request.id, %desync, "commit rejected after action completed");
                    return Err(EngineError::CommitRejected {
                        output: success.value.clone(),
                        desync,
                    });
                }
                Err(e) => return Err(EngineError::Store(e)),
            }
        }
    }
}

/// Short content digest of a provider output, for the snapshot payload.
fn output_digest(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

//! The scheduled export pipeline: fetch, render, archive, sync.
//!
//! A run is best-effort past the fetch stage. Each format is rendered,
//! written, and uploaded independently; whatever fails is recorded in the run
//! report and the pipeline moves on to the next format. Only a fetch failure
//! aborts the run, because without a snapshot there is nothing to render.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    domain::rates::RateSnapshot,
    infra::artifacts::{ArtifactStore, StorageError, timestamp_token},
};

use super::{
    rates::{FetchError, RateService},
    render::{DocumentFormat, DocumentRenderer, RenderError},
};

/// Remote archive backend accepting byte blobs under a flat namespace.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upload(&self, remote_path: &str, payload: Bytes) -> Result<(), RemoteError>;
}

/// Upload failures. Reported, never escalated past the run report.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote storage unreachable: {detail}")]
    Transport { detail: String },
    #[error("remote storage rejected the upload with status {status}")]
    Rejected { status: u16, detail: String },
    #[error("remote storage is not configured")]
    Disabled,
}

impl RemoteError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }

    pub fn rejected(status: u16, detail: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            detail: detail.into(),
        }
    }
}

/// Failure of the sync stage for one artifact.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read artifact back from disk: {0}")]
    ReadBack(#[from] StorageError),
    #[error(transparent)]
    Upload(#[from] RemoteError),
}

/// The only error a run can surface: the fetch stage failed and the run
/// aborted before producing any artifact.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("rate fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// What happened to one format within a run.
#[derive(Debug)]
pub enum ArtifactOutcome {
    Synced {
        local_path: String,
        remote_path: String,
    },
    SyncFailed {
        local_path: String,
        remote_path: String,
        error: SyncError,
    },
    WriteFailed {
        error: StorageError,
    },
    RenderFailed {
        error: RenderError,
    },
}

impl ArtifactOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    /// The artifact reached local storage, whether or not the sync succeeded.
    pub fn local_path(&self) -> Option<&str> {
        match self {
            Self::Synced { local_path, .. } | Self::SyncFailed { local_path, .. } => {
                Some(local_path)
            }
            Self::WriteFailed { .. } | Self::RenderFailed { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct ArtifactReport {
    pub format: DocumentFormat,
    pub outcome: ArtifactOutcome,
}

/// Ephemeral record of one pipeline execution. Logged, never persisted.
#[derive(Debug)]
pub struct ExportRun {
    pub run_id: String,
    pub started_at: OffsetDateTime,
    pub base_currency: String,
    pub artifacts: Vec<ArtifactReport>,
}

impl ExportRun {
    pub fn synced_count(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|report| report.outcome.is_synced())
            .count()
    }

    /// Emit one log line per artifact plus a run summary.
    pub fn log_report(&self) {
        for report in &self.artifacts {
            match &report.outcome {
                ArtifactOutcome::Synced {
                    local_path,
                    remote_path,
                } => info!(
                    target = "ratevault::export",
                    run_id = %self.run_id,
                    format = report.format.as_str(),
                    local_path = %local_path,
                    remote_path = %remote_path,
                    "artifact archived and synced"
                ),
                ArtifactOutcome::SyncFailed {
                    local_path,
                    remote_path,
                    error,
                } => warn!(
                    target = "ratevault::export",
                    run_id = %self.run_id,
                    format = report.format.as_str(),
                    local_path = %local_path,
                    remote_path = %remote_path,
                    error = %error,
                    "artifact archived locally but remote sync failed"
                ),
                ArtifactOutcome::WriteFailed { error } => warn!(
                    target = "ratevault::export",
                    run_id = %self.run_id,
                    format = report.format.as_str(),
                    error = %error,
                    "artifact could not be written to local storage"
                ),
                ArtifactOutcome::RenderFailed { error } => warn!(
                    target = "ratevault::export",
                    run_id = %self.run_id,
                    format = report.format.as_str(),
                    error = %error,
                    "artifact could not be rendered"
                ),
            }
        }

        info!(
            target = "ratevault::export",
            run_id = %self.run_id,
            base = %self.base_currency,
            synced = self.synced_count(),
            attempted = self.artifacts.len(),
            "export run finished"
        );
    }
}

/// Orchestrates one fetch and the per-format render/write/sync sequence.
pub struct ExportPipeline {
    rates: Arc<RateService>,
    renderers: Vec<Arc<dyn DocumentRenderer>>,
    artifacts: Arc<ArtifactStore>,
    remote: Arc<dyn RemoteStore>,
}

impl ExportPipeline {
    pub fn new(
        rates: Arc<RateService>,
        renderers: Vec<Arc<dyn DocumentRenderer>>,
        artifacts: Arc<ArtifactStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            rates,
            renderers,
            artifacts,
            remote,
        }
    }

    /// Execute one run. The returned report is complete even when every
    /// per-format stage failed; only a fetch failure is an error.
    pub async fn run(&self) -> Result<ExportRun, ExportError> {
        let started_at = OffsetDateTime::now_utc();
        let snapshot = self.rates.snapshot().await?;
        let run_id = timestamp_token(started_at);

        let mut artifacts = Vec::with_capacity(self.renderers.len());
        for renderer in &self.renderers {
            let outcome = self
                .export_format(renderer.as_ref(), &snapshot, &run_id)
                .await;
            artifacts.push(ArtifactReport {
                format: renderer.format(),
                outcome,
            });
        }

        let run = ExportRun {
            run_id,
            started_at,
            base_currency: snapshot.base_currency().to_string(),
            artifacts,
        };

        counter!("ratevault_export_runs_total").increment(1);
        counter!("ratevault_export_artifacts_synced_total").increment(run.synced_count() as u64);
        counter!("ratevault_export_artifacts_failed_total")
            .increment((run.artifacts.len() - run.synced_count()) as u64);

        Ok(run)
    }

    async fn export_format(
        &self,
        renderer: &dyn DocumentRenderer,
        snapshot: &RateSnapshot,
        token: &str,
    ) -> ArtifactOutcome {
        let artifact = match renderer.render(snapshot) {
            Ok(artifact) => artifact,
            Err(error) => return ArtifactOutcome::RenderFailed { error },
        };

        let stored = match self.artifacts.write_artifact(&artifact, token).await {
            Ok(stored) => stored,
            Err(error) => return ArtifactOutcome::WriteFailed { error },
        };

        // The upload deliberately re-reads the archived file rather than the
        // in-memory render, so the remote copy always matches what landed on
        // disk.
        let remote_path = format!("/{}", stored.relative_path);
        match self.sync(&stored.relative_path, &remote_path).await {
            Ok(()) => ArtifactOutcome::Synced {
                local_path: stored.relative_path,
                remote_path,
            },
            Err(error) => ArtifactOutcome::SyncFailed {
                local_path: stored.relative_path,
                remote_path,
                error,
            },
        }
    }

    async fn sync(&self, local_path: &str, remote_path: &str) -> Result<(), SyncError> {
        let payload = self.artifacts.read(local_path).await?;
        self.remote.upload(remote_path, payload).await?;
        Ok(())
    }
}

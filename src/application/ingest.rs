//! Spreadsheet ingestion: parse an uploaded workbook and archive the raw file.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::infra::{
    artifacts::{ArtifactStore, StorageError, timestamp_token},
    spreadsheet::{self, WorkbookError},
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Parsed rates plus the archive location of the raw upload.
#[derive(Debug)]
pub struct IngestedWorkbook {
    pub stored_path: String,
    pub rates: Vec<(String, f64)>,
}

pub struct IngestService {
    artifacts: Arc<ArtifactStore>,
}

impl IngestService {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// Parse first, persist second: a malformed workbook leaves no file
    /// behind and returns no partial mapping.
    pub async fn ingest(
        &self,
        original_name: &str,
        payload: Bytes,
    ) -> Result<IngestedWorkbook, IngestError> {
        let rates = spreadsheet::parse_workbook(&payload)?;

        let token = timestamp_token(OffsetDateTime::now_utc());
        let stored = self
            .artifacts
            .store_upload(original_name, &token, payload)
            .await?;

        info!(
            target = "ratevault::ingest",
            stored_path = %stored.stored_path,
            checksum = %stored.checksum,
            size_bytes = stored.size_bytes,
            rows = rates.len(),
            "archived spreadsheet upload"
        );

        Ok(IngestedWorkbook {
            stored_path: stored.stored_path,
            rates,
        })
    }
}

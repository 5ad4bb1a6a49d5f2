//! Local artifact storage: timestamped export documents and raw upload copies.

use std::fmt::Write as FmtWrite;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tokio::fs;

use crate::application::render::{DocumentFormat, RenderedArtifact};

const TIMESTAMP_TOKEN_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Render the second-granularity token used in archived filenames.
///
/// Uniqueness across runs rests entirely on this token; two runs inside the
/// same second would collide, which remains an accepted gap rather than a
/// locking problem solved here.
pub fn timestamp_token(at: OffsetDateTime) -> String {
    at.format(TIMESTAMP_TOKEN_FORMAT)
        .expect("valid timestamp token")
}

/// Errors that can occur while interacting with the artifact directory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Location of one archived export document.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Result of persisting a raw spreadsheet upload.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Filesystem-backed storage rooted at the configured upload directory.
///
/// Export documents and spreadsheet copies share one flat namespace; both are
/// served back over the `/uploads` route.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical archived name for an export document.
    pub fn artifact_filename(token: &str, format: DocumentFormat) -> String {
        format!("exchange_rates_{token}.{}", format.extension())
    }

    /// Persist a rendered document under its timestamped name.
    pub async fn write_artifact(
        &self,
        artifact: &RenderedArtifact,
        token: &str,
    ) -> Result<StoredArtifact, StorageError> {
        let relative_path = Self::artifact_filename(token, artifact.format);
        let absolute_path = self.resolve(&relative_path)?;
        fs::write(&absolute_path, &artifact.bytes).await?;
        Ok(StoredArtifact {
            relative_path,
            absolute_path,
        })
    }

    /// Persist a raw upload payload under `<token>_<sanitized name>`.
    pub async fn store_upload(
        &self,
        original_name: &str,
        token: &str,
        data: Bytes,
    ) -> Result<StoredUpload, StorageError> {
        let stored_path = format!("{token}_{}", sanitize_filename(original_name));
        let absolute = self.resolve(&stored_path)?;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let checksum = hex_from_bytes(&hasher.finalize());
        let size_bytes = data.len() as u64;

        fs::write(&absolute, &data).await?;

        Ok(StoredUpload {
            stored_path,
            checksum,
            size_bytes,
        })
    }

    /// Read a stored payload back into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, StorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Resolve the absolute filesystem path for a stored entry.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(StorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("upload");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "upload".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

fn hex_from_bytes(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = FmtWrite::write_fmt(&mut output, format_args!("{byte:02x}"));
    }
    output
}

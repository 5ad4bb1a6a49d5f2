//! Document rendering over rate snapshots.
//!
//! Rendering is intentionally kept pure: a renderer accepts an immutable
//! snapshot and produces an encoded byte blob, surfacing structured errors.
//! Side effects (persisting or uploading the result) happen in the caller.

mod docx;
mod pdf;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::domain::rates::RateSnapshot;

pub use docx::DocxRenderer;
pub use pdf::PdfRenderer;

/// Base name shared by every rendered document and archived artifact.
pub const DOCUMENT_BASENAME: &str = "exchange_rates";

/// Title line placed at the top of every rendered document.
pub(crate) const DOCUMENT_TITLE: &str = "Exchange Rates";

/// Column headers shared by both formats.
pub(crate) const HEADER_CURRENCY: &str = "Currency";
pub(crate) const HEADER_RATE: &str = "Rate";

/// The closed set of output encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pdf => "application/pdf",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }
}

/// A rendered document plus the filename offered to download clients.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub format: DocumentFormat,
    pub bytes: Bytes,
    pub suggested_filename: String,
}

/// Rendering never fails on data content, only on an encoding fault.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("document encoding failed: {detail}")]
    Encoding { detail: String },
}

impl RenderError {
    pub(crate) fn encoding(detail: impl ToString) -> Self {
        Self::Encoding {
            detail: detail.to_string(),
        }
    }
}

/// The one capability both formats implement.
pub trait DocumentRenderer: Send + Sync {
    fn format(&self) -> DocumentFormat;
    fn render(&self, snapshot: &RateSnapshot) -> Result<RenderedArtifact, RenderError>;
}

/// The fixed renderer list iterated by the export pipeline, in output order.
pub fn default_renderers() -> Vec<Arc<dyn DocumentRenderer>> {
    vec![Arc::new(DocxRenderer), Arc::new(PdfRenderer)]
}

pub(crate) fn suggested_filename(format: DocumentFormat) -> String {
    format!("{DOCUMENT_BASENAME}.{}", format.extension())
}

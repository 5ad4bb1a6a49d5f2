use std::sync::Arc;

use crate::application::export::ExportPipeline;

/// Shared context passed to the export job worker.
#[derive(Clone)]
pub struct ExportJobContext {
    pub pipeline: Arc<ExportPipeline>,
}

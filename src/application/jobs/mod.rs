mod context;
mod export_rates;

pub use context::ExportJobContext;
pub use export_rates::{ExportRatesJob, export_schedule, process_export_rates_job};

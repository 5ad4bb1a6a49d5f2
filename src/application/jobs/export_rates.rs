//! Cron job that drives the scheduled rates export.

use apalis::prelude::*;
use cron::Schedule;
use std::str::FromStr;
use tracing::{info, warn};

use super::context::ExportJobContext;

/// Marker struct for the cron-triggered export job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct ExportRatesJob;

impl From<chrono::DateTime<chrono::Utc>> for ExportRatesJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Run one export cycle. The worker reports success to the scheduler as long
/// as it got to run at all; a run that produced nothing is logged, not
/// retried, and the next tick starts fresh.
pub async fn process_export_rates_job(
    _job: ExportRatesJob,
    ctx: Data<ExportJobContext>,
) -> Result<(), apalis::prelude::Error> {
    info!(target = "ratevault::jobs", "starting scheduled rates export");
    match ctx.pipeline.run().await {
        Ok(run) => run.log_report(),
        Err(err) => {
            warn!(
                target = "ratevault::jobs",
                error = %err,
                "export run aborted before producing any artifact"
            );
        }
    }
    Ok(())
}

/// Parse the configured cron expression for the export schedule.
pub fn export_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(expression)
}

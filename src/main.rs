use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt as _,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use cron::Schedule;
use ratevault::{
    application::{
        error::AppError,
        export::{ExportPipeline, RemoteStore},
        history::HistoryService,
        ingest::IngestService,
        jobs::{ExportJobContext, process_export_rates_job},
        rates::RateService,
        render::default_renderers,
    },
    config,
    infra::{
        artifacts::ArtifactStore,
        error::InfraError,
        history_api::YahooChartClient,
        http::{self, HttpState},
        rates_api::ExchangeRateApiClient,
        remote::{DisabledRemote, DropboxRemote},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ExportOnce(_) => run_export_once(settings).await,
    }
}

struct ApplicationContext {
    http_state: HttpState,
    job_context: ExportJobContext,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let api_key = settings
        .rates
        .api_key
        .clone()
        .ok_or_else(|| InfraError::configuration("rates.api_key is not configured"))
        .map_err(AppError::from)?;

    let rate_provider = Arc::new(ExchangeRateApiClient::new(
        settings.rates.endpoint.clone(),
        api_key,
    ));
    let rates = Arc::new(RateService::new(
        rate_provider,
        settings.rates.base_currency.clone(),
        settings.rates.target_currencies.clone(),
    ));

    let history = Arc::new(HistoryService::new(Arc::new(YahooChartClient::new(
        settings.history.endpoint.clone(),
    ))));

    let artifacts = Arc::new(
        ArtifactStore::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let remote: Arc<dyn RemoteStore> = match settings.remote.access_token.clone() {
        Some(token) => Arc::new(DropboxRemote::new(settings.remote.endpoint.clone(), token)),
        None => {
            warn!(
                target = "ratevault::startup",
                "no remote access token configured, artifact sync will be reported as failed"
            );
            Arc::new(DisabledRemote)
        }
    };

    let renderers = default_renderers();
    let pipeline = Arc::new(ExportPipeline::new(
        rates.clone(),
        renderers.clone(),
        artifacts.clone(),
        remote,
    ));

    let http_state = HttpState {
        rates,
        history,
        ingest: Arc::new(IngestService::new(artifacts.clone())),
        renderers: Arc::new(renderers),
        artifacts,
    };

    Ok(ApplicationContext {
        http_state,
        job_context: ExportJobContext { pipeline },
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let monitor_handle = spawn_job_monitor(app.job_context, &settings.export.schedule);

    let result = serve_http(&settings, app.http_state).await;

    // Stop accepting new scheduler ticks; an in-flight run is not awaited.
    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_export_once(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    info!(target = "ratevault::export", "starting one-shot export run");
    let run = app
        .job_context
        .pipeline
        .run()
        .await
        .map_err(|err| AppError::unexpected(format!("export run failed: {err}")))?;
    run.log_report();

    Ok(())
}

fn spawn_job_monitor(context: ExportJobContext, schedule: &Schedule) -> tokio::task::JoinHandle<()> {
    let export_worker = WorkerBuilder::new("export-rates-worker")
        .data(context)
        .backend(CronStream::new(schedule.clone()))
        .build_fn(process_export_rates_job);

    let monitor = Monitor::new().register(export_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let upload_body_limit = settings.uploads.max_request_bytes.get() as usize;
    let router = http::build_router(state, upload_body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "ratevault::startup",
        addr = %settings.server.public_addr,
        "listening for requests"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown signal handler");
    }
}

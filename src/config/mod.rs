//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use cron::Schedule;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ratevault";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_EXPORT_SCHEDULE: &str = "0 0 * * * *";
const DEFAULT_RATES_ENDPOINT: &str = "https://v6.exchangerate-api.com";
const DEFAULT_BASE_CURRENCY: &str = "USD";
const DEFAULT_TARGET_CURRENCIES: &[&str] = &["RUB", "EUR", "GBP", "CNY", "JPY"];
const DEFAULT_HISTORY_ENDPOINT: &str = "https://query1.finance.yahoo.com";
const DEFAULT_REMOTE_ENDPOINT: &str = "https://content.dropboxapi.com";

/// Command-line arguments for the ratevault binary.
#[derive(Debug, Parser)]
#[command(name = "ratevault", version, about = "Exchange-rate archival service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RATEVAULT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service with the background export scheduler.
    Serve(Box<ServeArgs>),
    /// Run a single export cycle and exit.
    #[command(name = "export")]
    ExportOnce(ExportOnceArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ExportOnceArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the artifact and upload directory.
    #[arg(long = "uploads-directory", value_name = "PATH")]
    pub uploads_directory: Option<PathBuf>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override the export cron schedule (seconds-resolution expression).
    #[arg(long = "export-schedule", value_name = "CRON")]
    pub export_schedule: Option<String>,

    /// Override the rate provider API key.
    #[arg(long = "rates-api-key", value_name = "KEY")]
    pub rates_api_key: Option<String>,

    /// Override the base currency quotes are fetched against.
    #[arg(long = "rates-base-currency", value_name = "CODE")]
    pub rates_base_currency: Option<String>,

    /// Override the remote storage access token.
    #[arg(long = "remote-access-token", value_name = "TOKEN")]
    pub remote_access_token: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub uploads: UploadSettings,
    pub export: ExportSettings,
    pub rates: RatesSettings,
    pub history: HistorySettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub schedule: Schedule,
}

#[derive(Debug, Clone)]
pub struct RatesSettings {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub base_currency: String,
    pub target_currencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub endpoint: Url,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub endpoint: Url,
    pub access_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RATEVAULT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_overrides(&args.overrides),
        Some(Command::ExportOnce(args)) => raw.apply_overrides(&args.overrides),
        None => raw.apply_overrides(&Overrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    uploads: RawUploadSettings,
    export: RawExportSettings,
    rates: RawRatesSettings,
    history: RawHistorySettings,
    remote: RawRemoteSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(schedule) = overrides.export_schedule.as_ref() {
            self.export.schedule = Some(schedule.clone());
        }
        if let Some(key) = overrides.rates_api_key.as_ref() {
            self.rates.api_key = Some(key.clone());
        }
        if let Some(base) = overrides.rates_base_currency.as_ref() {
            self.rates.base_currency = Some(base.clone());
        }
        if let Some(token) = overrides.remote_access_token.as_ref() {
            self.remote.access_token = Some(token.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            uploads,
            export,
            rates,
            history,
            remote,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let uploads = build_upload_settings(uploads)?;
        let export = build_export_settings(export)?;
        let rates = build_rates_settings(rates)?;
        let history = build_history_settings(history)?;
        let remote = build_remote_settings(remote)?;

        Ok(Self {
            server,
            logging,
            uploads,
            export,
            rates,
            history,
            remote,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let directory = uploads
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        directory,
        max_request_bytes,
    })
}

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let expression = export
        .schedule
        .unwrap_or_else(|| DEFAULT_EXPORT_SCHEDULE.to_string());
    let schedule = Schedule::from_str(&expression).map_err(|err| {
        LoadError::invalid(
            "export.schedule",
            format!("`{expression}` is not a valid cron expression: {err}"),
        )
    })?;

    Ok(ExportSettings { schedule })
}

fn build_rates_settings(rates: RawRatesSettings) -> Result<RatesSettings, LoadError> {
    let endpoint = parse_endpoint(
        rates.endpoint.as_deref().unwrap_or(DEFAULT_RATES_ENDPOINT),
        "rates.endpoint",
    )?;

    let api_key = rates.api_key.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let base_currency = rates
        .base_currency
        .unwrap_or_else(|| DEFAULT_BASE_CURRENCY.to_string());
    if base_currency.trim().is_empty() {
        return Err(LoadError::invalid(
            "rates.base_currency",
            "must not be empty",
        ));
    }

    let target_currencies = match rates.target_currencies {
        Some(currencies) => {
            if currencies.is_empty() {
                return Err(LoadError::invalid(
                    "rates.target_currencies",
                    "must list at least one currency",
                ));
            }
            currencies
        }
        None => DEFAULT_TARGET_CURRENCIES
            .iter()
            .map(|code| code.to_string())
            .collect(),
    };

    Ok(RatesSettings {
        endpoint,
        api_key,
        base_currency,
        target_currencies,
    })
}

fn build_history_settings(history: RawHistorySettings) -> Result<HistorySettings, LoadError> {
    let endpoint = parse_endpoint(
        history
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_HISTORY_ENDPOINT),
        "history.endpoint",
    )?;
    Ok(HistorySettings { endpoint })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let endpoint = parse_endpoint(
        remote
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_REMOTE_ENDPOINT),
        "remote.endpoint",
    )?;

    let access_token = remote.access_token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(RemoteSettings {
        endpoint,
        access_token,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    schedule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRatesSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    base_currency: Option<String>,
    target_currencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHistorySettings {
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    endpoint: Option<String>,
    access_token: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_endpoint(value: &str, key: &'static str) -> Result<Url, LoadError> {
    Url::parse(value).map_err(|err| LoadError::invalid(key, format!("invalid url: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.public_port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = Overrides {
            public_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.public_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_cover_the_whole_stack() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.public_addr.port(), 8000);
        assert_eq!(settings.rates.base_currency, "USD");
        assert_eq!(
            settings.rates.target_currencies,
            vec!["RUB", "EUR", "GBP", "CNY", "JPY"]
        );
        assert!(settings.rates.api_key.is_none());
        assert!(settings.remote.access_token.is_none());
        assert_eq!(
            settings.uploads.max_request_bytes.get(),
            DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
        );
    }

    #[test]
    fn invalid_schedule_is_rejected_at_load_time() {
        let mut raw = RawSettings::default();
        raw.export.schedule = Some("whenever".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "export.schedule", .. })
        ));
    }

    #[test]
    fn empty_target_list_is_rejected() {
        let mut raw = RawSettings::default();
        raw.rates.target_currencies = Some(Vec::new());
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn blank_credentials_are_normalised_to_none() {
        let mut raw = RawSettings::default();
        raw.rates.api_key = Some("   ".to_string());
        raw.remote.access_token = Some("".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.rates.api_key.is_none());
        assert!(settings.remote.access_token.is_none());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = Overrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["ratevault"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_export_once_arguments() {
        let args = CliArgs::parse_from([
            "ratevault",
            "export",
            "--rates-api-key",
            "k0",
            "--uploads-directory",
            "/tmp/rates",
        ]);

        match args.command.expect("export command") {
            Command::ExportOnce(export) => {
                assert_eq!(export.overrides.rates_api_key.as_deref(), Some("k0"));
                assert_eq!(
                    export.overrides.uploads_directory.as_deref(),
                    Some(std::path::Path::new("/tmp/rates"))
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "ratevault",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--export-schedule",
            "0 30 * * * *",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.export_schedule.as_deref(),
                    Some("0 30 * * * *")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}

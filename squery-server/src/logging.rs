use anyhow::Context;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    prelude::*,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "squery=debug,squery_server=debug,tower_http=debug,axum=info,warn";

/// Where and how the route handler's log file is written.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// One JSON object per line in the file instead of plain text.
    pub json_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "squery-server".to_string(),
            default_filter: DEFAULT_FILTER.to_string(),
            json_file: false,
        }
    }
}

impl LogConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn json_file(mut self, json: bool) -> Self {
        self.json_file = json;
        self
    }
}

/// Installs the global subscriber: stderr plus a daily rolling `<prefix>.*.log`
/// file under `config.dir`.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for as long as the server runs. Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("creating log directory {}", config.dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.dir)
        .context("building rolling log file appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr);

    let (plain_file, json_file) = if config.json_file {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(file_writer);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_writer(file_writer);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(plain_file)
        .with(json_file)
        .try_init()
        .context("installing global tracing subscriber")?;

    tracing::info!(
        dir = %config.dir.display(),
        json = config.json_file,
        "Logging initialized"
    );
    Ok(guard)
}

/// Console-only logging for tests. Safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("squery=trace,debug")),
        )
        .with_test_writer()
        .try_init();
}

//! # Structured Logging Module
//!
//! Console logging for the per-client parser pipelines and checkpoint activity, plus an
//! optional JSON file sink. Output is set up once per process from [`LoggingOptions`].

use crate::config::detect_environment;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOG_FILE: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Where and how verbosely to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub environment: String,
    /// `EnvFilter` directive
    pub level: String,
    /// Directory of the JSON log file; console only when `None`
    pub directory: Option<PathBuf>,
}

impl LoggingOptions {
    /// Options from the process environment
    ///
    /// `RUST_LOG` overrides the level and `PHOS_LOG_DIR` enables the file sink.
    pub fn from_env() -> Self {
        let environment = detect_environment();
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level(&environment).into());
        Self {
            directory: std::env::var_os("PHOS_LOG_DIR").map(PathBuf::from),
            environment,
            level,
        }
    }
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Initialize logging from the process environment; see [`LoggingOptions::from_env`]
pub fn init_structured_logging() -> Option<&'static Path> {
    init_logging_with(LoggingOptions::from_env())
}

/// Install the global subscriber once; later calls return the first call's log file
pub fn init_logging_with(options: LoggingOptions) -> Option<&'static Path> {
    LOG_FILE
        .get_or_init(|| install(&options))
        .as_deref()
}

fn install(options: &LoggingOptions) -> Option<PathBuf> {
    let file = options.directory.as_deref().and_then(|dir| {
        open_log_file(dir, &options.environment)
            .map_err(|err| eprintln!("phos: file logging disabled, {}: {err}", dir.display()))
            .ok()
    });
    let (writer, log_path) = match file {
        Some((writer, guard, path)) => {
            // Flushing guard must outlive the process
            std::mem::forget(guard);
            (Some(writer), Some(path))
        }
        None => (None, None),
    };

    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(EnvFilter::new(&options.level));
    let json_file = writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_thread_ids(true)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new(&options.level))
    });

    // An embedding process may already own the global subscriber
    if tracing_subscriber::registry()
        .with(console)
        .with(json_file)
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already set, keeping it");
    }

    tracing::info!(
        pid = process::id(),
        environment = %options.environment,
        level = %options.level,
        log_file = ?log_path,
        "🔧 LOGGING: initialized"
    );
    log_path
}

/// `<dir>/<environment>.<pid>.<timestamp>.log`
fn open_log_file(dir: &Path, environment: &str) -> io::Result<(NonBlocking, WorkerGuard, PathBuf)> {
    fs::create_dir_all(dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{environment}.{}.{timestamp}.log", process::id());
    let path = dir.join(&filename);
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, filename));
    Ok((writer, guard, path))
}

/// Log structured data for handle lifecycle operations
pub fn log_handle_operation(
    operation: &str,
    client_id: Option<&str>,
    handle: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        client_id = client_id,
        handle = %handle,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧩 HANDLE_OPERATION"
    );
}

/// Log structured data for checkpoint operations
pub fn log_checkpoint_operation(
    operation: &str,
    version: u64,
    listed: usize,
    captured: usize,
    deferred: usize,
    failed: usize,
) {
    tracing::info!(
        operation = %operation,
        version = version,
        listed = listed,
        captured = captured,
        deferred = deferred,
        failed = failed,
        timestamp = %Utc::now().to_rfc3339(),
        "📸 CHECKPOINT_OPERATION"
    );
}

/// Log structured data for parser pipeline lifecycle events
pub fn log_pipeline_event(client_id: &str, event: &str, details: Option<&str>) {
    tracing::info!(
        client_id = %client_id,
        event = %event,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 PIPELINE_EVENT"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

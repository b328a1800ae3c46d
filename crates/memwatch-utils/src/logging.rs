//! # Logging Utilities
//!
//! Diagnostic logging for memwatch using `tracing`.
//!
//! Sampling results go to stdout, so every log line goes to **stderr** (and
//! optionally to a file). This module provides:
//! - Pretty (development) and JSON (machine readable) output
//! - Environment variable configuration
//! - An explicit level for the CLI's `--log-level` flag
//! - Optional file output, flushed by a guard held for the program's lifetime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memwatch_utils::init_logging;
//!
//! // Reads RUST_LOG, MEMWATCH_LOG_FORMAT and MEMWATCH_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::warn!("only warnings and errors are shown by default");
//! tracing::debug!("shown with RUST_LOG=debug");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=memwatch_core=trace`), default `warn`
//! - `MEMWATCH_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `MEMWATCH_LOG_FILE`: Optional log file; a directory gets a dated `memwatch.log` inside it
//!
//! ## Examples
//!
//! ```rust,no_run
//! use memwatch_utils::{init_logging_with_level, LogFormat, LogLevel};
//!
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json).expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self as tracing_fmt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "MEMWATCH_LOG_FORMAT";

/// Environment variable naming the log file
pub const LOG_FILE_ENV: &str = "MEMWATCH_LOG_FILE";

/// Level used when neither an explicit level nor `RUST_LOG` is given
pub const DEFAULT_LEVEL: LogLevel = LogLevel::Warn;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable, one event per line (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default)
    Warn,
    /// Info level
    Info,
    /// Debug level: mapping changes, calibration, priority changes
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&Level::from(*self), f)
    }
}

/// Keeps the file writer alive; drop it last so buffered lines are flushed.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment.
///
/// - `RUST_LOG`: filter directives, default `warn`
/// - `MEMWATCH_LOG_FORMAT`: `json` or `pretty` (default)
/// - `MEMWATCH_LOG_FILE`: optional log file or directory
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `MEMWATCH_LOG_FORMAT` is set to an unknown format
/// - The log file can't be created
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    init(None, format)
}

/// Initialize logging with an explicit level, ignoring `RUST_LOG`.
///
/// `MEMWATCH_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file can't be created.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    init(Some(level), format)
}

/// Initialize logging with an explicit format; the level still comes from `RUST_LOG`.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file can't be created.
pub fn init_logging_with_format(format: LogFormat) -> Result<LogGuard, LoggingError>
{
    init(None, format)
}

fn init(level: Option<LogLevel>, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = || build_filter(level, rust_log.as_deref());

    let mut layers = vec![console_layer(format, filter())];
    let mut guard = None;
    if let Some(path) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) {
        let appender = file_appender(&path, Utc::now().date_naive())?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(file_layer(format, writer, filter()));
        guard = Some(worker);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LogGuard { _file: guard })
}

/// Resolve the filter: an explicit level wins, then `RUST_LOG`, then [`DEFAULT_LEVEL`].
///
/// Unparseable `RUST_LOG` directives fall back to the default level.
pub fn build_filter(level: Option<LogLevel>, rust_log: Option<&str>) -> EnvFilter
{
    let fallback = || EnvFilter::new(DEFAULT_LEVEL.to_string());
    match (level, rust_log) {
        (Some(level), _) => EnvFilter::new(level.to_string()),
        (None, Some(directives)) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| fallback())
        }
        _ => fallback(),
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = tracing_fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(io::IsTerminal::is_terminal(&io::stderr())).with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_filter(filter).boxed(),
    }
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    let layer = tracing_fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false); // No ANSI in files

    match format {
        LogFormat::Pretty => layer.with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).with_filter(filter).boxed(),
    }
}

/// Where a `MEMWATCH_LOG_FILE` value sends log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFileTarget
{
    /// A single dated file inside a directory, never rotated
    Dated
    {
        /// Directory holding the file
        directory: PathBuf,
        /// `YYYY-MM-DD-memwatch.log`
        file_name: String,
    },
    /// The given file, rotated daily
    Daily
    {
        /// Directory holding the file
        directory: PathBuf,
        /// File name prefix
        file_name: PathBuf,
    },
}

/// Decide how to log to `path`, dating the file with `today` if `path` is a directory.
pub fn log_file_target(path: &Path, today: NaiveDate) -> LogFileTarget
{
    if path.is_dir() || path.as_os_str().to_string_lossy().ends_with('/') {
        return LogFileTarget::Dated {
            directory: path.to_path_buf(),
            file_name: format!("{}-memwatch.log", today.format("%Y-%m-%d")),
        };
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().map_or_else(|| PathBuf::from("memwatch.log"), PathBuf::from);
    LogFileTarget::Daily { directory, file_name }
}

fn file_appender(path: &Path, today: NaiveDate) -> Result<RollingFileAppender, LoggingError>
{
    match log_file_target(path, today) {
        LogFileTarget::Dated { directory, file_name } => {
            std::fs::create_dir_all(&directory)?;
            Ok(rolling::never(directory, file_name))
        }
        LogFileTarget::Daily { directory, file_name } => {
            std::fs::create_dir_all(&directory)?;
            Ok(rolling::daily(directory, file_name))
        }
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// Failed to install the subscriber (usually: already initialized)
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

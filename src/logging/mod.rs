//! Logging configuration and initialization
//!
//! Centralized logging setup using the `tracing` ecosystem. Diagnostics from
//! the callback pipelines go through `tracing::debug!`/`trace!` and are gated
//! by the verbosity settings in [`crate::config`]; this module only controls
//! how (and whether) those events are rendered.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard tracing filter, takes precedence when set
//! - `OMNITRACE_LOG_LEVEL`: simple log level (error, warn, info, debug, trace)
//! - `OMNITRACE_LOG_FORMAT`: output format ("human" or "json")
//! - `OMNITRACE_LOG_FILE`: optional file path for JSON log output

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "OMNITRACE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "OMNITRACE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "OMNITRACE_LOG_FILE";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("failed to open log file: {0}")]
    FileOpenFailed(String),
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    /// Default: the tracer should be quiet inside someone else's process.
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to EnvFilter string
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output to stderr (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

impl LogFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "pretty" | "console" => Some(LogFormat::Human),
            "json" | "structured" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Initialize logging from environment variables.
///
/// Idempotent: only the first call installs a subscriber. Later calls (and
/// calls into an application that already installed its own subscriber) are
/// no-ops, so the tracer never fights the host over global logging state.
pub fn init_from_env() {
    TRACING_INITIALIZED.get_or_init(|| {
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| LogLevel::from_str(&s))
            .unwrap_or_default();
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| LogFormat::from_str(&s))
            .unwrap_or_default();
        let file = std::env::var(LOG_FILE_ENV).ok().map(PathBuf::from);
        let _ = try_init(level, format, file.as_deref());
    });
}

fn build_env_filter(default_level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(rust_log)
            .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()));
    }
    Ok(EnvFilter::new(default_level.as_filter_str()))
}

fn try_init(
    level: LogLevel,
    format: LogFormat,
    file: Option<&std::path::Path>,
) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(level)?;

    let file_handle = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::FileOpenFailed(e.to_string()))?;
            Some(std::sync::Arc::new(file))
        }
        None => None,
    };

    // try_init instead of init: the traced application may already own the
    // global subscriber.
    match format {
        LogFormat::Json => {
            let file_layer = file_handle.map(|file| {
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
            });
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .with(file_layer)
                .try_init()
                .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()))
        }
        LogFormat::Human => {
            let file_layer = file_handle.map(|file| {
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
            });
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(file_layer)
                .try_init()
                .map_err(|e| LoggingError::InvalidLogLevel(e.to_string()))
        }
    }
}

/// Check if this crate installed (or attempted to install) the subscriber
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_from_env_idempotent() {
        init_from_env();
        init_from_env();
        assert!(is_initialized());
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("human"), Some(LogFormat::Human));
        assert_eq!(LogFormat::from_str("pretty"), Some(LogFormat::Human));
        assert_eq!(LogFormat::from_str("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_str("bogus"), None);
    }

    #[test]
    fn test_default_level_is_warn() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
    }

    #[test]
    fn test_file_output_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("omnitrace.log");
        // another test may already own the global subscriber; the file must
        // exist either way
        let _ = try_init(LogLevel::Debug, LogFormat::Human, Some(&path));
        assert!(path.exists());
    }
}

//! # Observability
//!
//! Centralized tracing setup for the Kyrant workspace.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! Two sinks are available:
//!
//! - compact, human-oriented lines on stderr
//! - JSON lines appended to a log file (`~/.kyrant/logs/auth.jsonl` by default)
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "kyrant-auth".into(),
//!         default_level: "debug".into(),
//!         format: observability::LogFormat::Json,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod writer;

pub use writer::LogFileWriter;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format of the primary sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line output on stderr.
    #[default]
    Compact,
    /// JSON lines appended to the log file.
    Json,
}

impl LogFormat {
    /// Parse a format name; anything unrecognised falls back to compact.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, attached to every JSON line as the root span.
    pub service_name: String,

    /// Default filter (e.g. "info", "kyrant_auth=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// Primary sink format.
    pub format: LogFormat,

    /// Log file for [`LogFormat::Json`]. Defaults to `~/.kyrant/logs/auth.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr when the primary sink is the log file.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            format: LogFormat::Compact,
            log_path: None,
            also_stderr: false,
        }
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kyrant").join("logs").join("auth.jsonl"))
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging with defaults for the given service name.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the global subscriber.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place. If the JSON log file cannot be opened, logging
/// degrades to compact stderr output.
pub fn init_with_config(config: LogConfig) {
    let file_writer = match config.format {
        LogFormat::Json => {
            let path = config.log_path.clone().or_else(default_log_path);
            path.and_then(|path| match LogFileWriter::open(&path) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    eprintln!("failed to open log file {}: {}", path.display(), e);
                    None
                }
            })
        }
        LogFormat::Compact => None,
    };

    let stderr_enabled = file_writer.is_none() || config.also_stderr;

    let json_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .with_filter(env_filter(&config.default_level))
    });

    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, format = ?config.format, "logging initialized");
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

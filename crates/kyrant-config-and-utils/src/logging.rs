//! Logging initialization.
//!
//! Thin wrapper over the observability package so every binary configures
//! tracing the same way.

use observability::{LogConfig, LogFormat};
use std::path::PathBuf;

const DEFAULT_SERVICE_NAME: &str = "kyrant-auth";

/// Initialize logging for the default service.
///
/// `KYRANT_LOG_FORMAT=json` switches the primary sink to JSON lines in
/// `~/.kyrant/logs/auth.jsonl` (or `KYRANT_LOG_FILE`); anything else
/// logs compact lines to stderr. `RUST_LOG` overrides `level`.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("ready");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service(DEFAULT_SERVICE_NAME, level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let format = std::env::var("KYRANT_LOG_FORMAT")
        .ok()
        .and_then(non_empty_env)
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();

    let log_path = std::env::var("KYRANT_LOG_FILE")
        .ok()
        .and_then(non_empty_env)
        .map(PathBuf::from);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        format,
        log_path,
        also_stderr: false,
    });
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

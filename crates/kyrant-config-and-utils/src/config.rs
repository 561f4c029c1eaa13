//! Configuration management for the auth client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://kyrant.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "kyrant-publishable-key",
};

/// Public origin of the web app, used to build OAuth and email redirect targets.
pub const DEFAULT_SITE_URL: &str = match option_env!("KYRANT_SITE_URL") {
    Some(url) => url,
    None => "http://localhost:5173",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Upper bound on the initial auth check before loading is forced to resolve.
pub const DEFAULT_SAFETY_TIMEOUT_MS: u64 = 10_000;

/// How long to wait for `SignedIn` after landing on an OAuth callback URL.
pub const DEFAULT_CALLBACK_WAIT_MS: u64 = 5_000;

/// Retry policy for fetching a profile the backend trigger may not have written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit; retry `n` waits `n * base_delay_ms`.
    pub base_delay_ms: u64,
}

impl Default for ProfileRetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

/// Auth client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Web app origin for redirect targets.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Safety timer for the initial auth check, in milliseconds.
    #[serde(default = "default_safety_timeout_ms")]
    pub safety_timeout_ms: u64,
    /// Secondary wait on OAuth callback URLs, in milliseconds.
    #[serde(default = "default_callback_wait_ms")]
    pub callback_wait_ms: u64,
    /// Profile fetch retry policy.
    #[serde(default)]
    pub profile_retry: ProfileRetrySettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

fn default_safety_timeout_ms() -> u64 {
    DEFAULT_SAFETY_TIMEOUT_MS
}

fn default_callback_wait_ms() -> u64 {
    DEFAULT_CALLBACK_WAIT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            site_url: default_site_url(),
            safety_timeout_ms: DEFAULT_SAFETY_TIMEOUT_MS,
            callback_wait_ms: DEFAULT_CALLBACK_WAIT_MS,
            profile_retry: ProfileRetrySettings::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Only the log level is overridable at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("KYRANT_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level;
            }
        }
    }

    /// Reject values that would make the auth state machine misbehave.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        self.site_url()?;

        if self.safety_timeout_ms == 0 {
            return Err(CoreError::Config(
                "safety_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.callback_wait_ms >= self.safety_timeout_ms {
            return Err(CoreError::Config(format!(
                "callback_wait_ms ({}) must be shorter than safety_timeout_ms ({})",
                self.callback_wait_ms, self.safety_timeout_ms
            )));
        }

        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Get the site URL as a parsed URL.
    pub fn site_url(&self) -> CoreResult<Url> {
        Url::parse(&self.site_url).map_err(CoreError::from)
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn callback_wait(&self) -> Duration {
        Duration::from_millis(self.callback_wait_ms)
    }
}

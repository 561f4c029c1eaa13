//! Configuration, paths, and logging setup shared by the Kyrant auth crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, ProfileRetrySettings, DEFAULT_CALLBACK_WAIT_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_SAFETY_TIMEOUT_MS, DEFAULT_SITE_URL, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;

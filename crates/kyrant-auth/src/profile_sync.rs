//! Profile fetching with retries.
//!
//! The profile row is written by a backend trigger after the identity is
//! created, so the first reads for a brand-new user can miss it.

use crate::provider::ProfileStore;
use crate::types::RoleProfile;
use kyrant_config_and_utils::ProfileRetrySettings;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry behaviour for profile reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Retry `n` waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for ProfileRetryConfig {
    fn default() -> Self {
        Self::from(&ProfileRetrySettings::default())
    }
}

impl From<&ProfileRetrySettings> for ProfileRetryConfig {
    fn from(settings: &ProfileRetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        }
    }
}

impl ProfileRetryConfig {
    /// Delay before retry number `retry` (1-based). Linear backoff.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Fetch the profile for `user_id`, retrying while it is missing or the
/// store fails transiently.
///
/// Returns `None` once retries are exhausted or on a permanent error; a
/// missing profile is never an error for callers.
pub async fn fetch_profile_with_retry(
    store: &dyn ProfileStore,
    user_id: &str,
    config: &ProfileRetryConfig,
) -> Option<RoleProfile> {
    for attempt in 0..config.max_attempts() {
        if attempt > 0 {
            tokio::time::sleep(config.delay_for_retry(attempt)).await;
        }

        match store.fetch_profile(user_id).await {
            Ok(Some(profile)) => {
                debug!(user_id = %user_id, attempt = attempt + 1, "Profile loaded");
                return Some(profile);
            }
            Ok(None) => {
                debug!(user_id = %user_id, attempt = attempt + 1, "Profile not found yet");
            }
            Err(e) if e.is_transient() => {
                warn!(user_id = %user_id, attempt = attempt + 1, error = %e, "Transient profile fetch failure");
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile fetch failed");
                return None;
            }
        }
    }

    info!(
        user_id = %user_id,
        attempts = config.max_attempts(),
        "Profile not available after retries"
    );
    None
}

//! Typed access to the OAuth role protocol keys.

use crate::{DurableStorage, StorageKeys, StorageResult};
use std::sync::Arc;
use tracing::debug;

/// High-level API over the raw cross-navigation keys.
///
/// Values come back as raw strings; callers must validate them before use.
#[derive(Clone)]
pub struct IntentStorage {
    storage: Arc<dyn DurableStorage>,
}

impl IntentStorage {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Underlying storage, for provider adapters that keep their own keys there.
    pub fn storage(&self) -> Arc<dyn DurableStorage> {
        self.storage.clone()
    }

    // ==========================================
    // Signup role
    // ==========================================

    pub fn set_signup_role(&self, role: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::OAUTH_ROLE, role)
    }

    pub fn signup_role(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::OAUTH_ROLE)
    }

    pub fn clear_signup_role(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::OAUTH_ROLE)
    }

    // ==========================================
    // Expected login role
    // ==========================================

    pub fn set_expected_role(&self, role: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::OAUTH_EXPECTED_ROLE, role)
    }

    pub fn expected_role(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::OAUTH_EXPECTED_ROLE)
    }

    pub fn clear_expected_role(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::OAUTH_EXPECTED_ROLE)
    }

    // ==========================================
    // Last OAuth error
    // ==========================================

    pub fn set_oauth_error(&self, message: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::OAUTH_ERROR, message)
    }

    pub fn clear_oauth_error(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::OAUTH_ERROR)
    }

    /// Read and delete the last OAuth error message.
    pub fn take_oauth_error(&self) -> StorageResult<Option<String>> {
        let message = self.storage.get(StorageKeys::OAUTH_ERROR)?;
        if message.is_some() {
            self.storage.delete(StorageKeys::OAUTH_ERROR)?;
        }
        Ok(message)
    }

    // ==========================================
    // Bulk operations
    // ==========================================

    /// Delete every key starting with `prefix`. Returns the number removed.
    pub fn purge_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let keys = self.storage.list_keys_with_prefix(prefix)?;
        let mut removed = 0;
        for key in keys {
            if self.storage.delete(&key)? {
                removed += 1;
            }
        }
        debug!(prefix = %prefix, removed, "Purged storage keys");
        Ok(removed)
    }

    /// Delete all protocol keys.
    pub fn clear_all(&self) -> StorageResult<()> {
        for key in StorageKeys::ALL {
            self.storage.delete(key)?;
        }
        Ok(())
    }
}

//! Durable cross-navigation storage for the Kyrant auth client.
//!
//! A web client keeps OAuth bookkeeping in browser local storage so it
//! survives a full-page redirect. This crate provides the same contract for
//! native clients:
//! - **[`FileStorage`]**: a JSON file written through on every mutation
//! - **[`MemoryStorage`]**: process-local, for tests and ephemeral clients

mod file;
mod intents;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use intents::IntentStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::DurableStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

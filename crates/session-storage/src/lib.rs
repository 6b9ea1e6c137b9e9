//! Session persistence for the authflow client.
//!
//! The auth engine never touches storage directly. It calls the
//! [`SessionStore`] hook, and this crate provides:
//! - [`SecureStorage`]: a key/value backend trait
//! - [`MemoryStorage`] and [`FileStorage`] backends
//! - [`SessionVault`]: a [`SessionStore`] over any backend

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::{SecureStorage, SessionStore};
pub use vault::{SessionVault, StoredSession};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a vault that keeps the session in memory only.
pub fn ephemeral_vault() -> SessionVault {
    SessionVault::new(Box::new(MemoryStorage::new()))
}

/// Create a vault persisted to a JSON file.
pub fn file_vault(path: impl Into<std::path::PathBuf>) -> SessionVault {
    SessionVault::new(Box::new(FileStorage::new(path)))
}

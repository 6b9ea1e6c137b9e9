//! Storage trait definitions.

use crate::{StorageResult, StoredSession};

/// Trait for key/value storage backends holding session secrets.
pub trait SecureStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Load/save hook the session context calls to rehydrate and persist tokens.
///
/// `save` is called after every token replacement and `clear` on sign-out or
/// when a refresh is rejected.
pub trait SessionStore: Send + Sync {
    /// Load the persisted session, if any.
    fn load(&self) -> StorageResult<Option<StoredSession>>;

    /// Persist the session, replacing whatever was stored.
    fn save(&self, session: &StoredSession) -> StorageResult<()>;

    /// Remove any persisted session.
    fn clear(&self) -> StorageResult<()>;
}

//! Session persistence on top of a [`SecureStorage`] backend.

use crate::{SecureStorage, SessionStore, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted session as seen by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Non-secret session metadata, stored as one JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    /// When the access token expires
    expires_at: DateTime<Utc>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

/// [`SessionStore`] that splits a session across three storage keys.
pub struct SessionVault {
    storage: Box<dyn SecureStorage>,
}

impl SessionVault {
    /// Create a new vault with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    fn read_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.storage.get(StorageKeys::SESSION_META)? {
            Some(json) => {
                let meta = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    fn delete_all(&self) {
        let _ = self.storage.delete(StorageKeys::ACCESS_TOKEN);
        let _ = self.storage.delete(StorageKeys::REFRESH_TOKEN);
        let _ = self.storage.delete(StorageKeys::SESSION_META);
    }
}

impl SessionStore for SessionVault {
    fn load(&self) -> StorageResult<Option<StoredSession>> {
        let access_token = self.storage.get(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        let meta = match self.read_meta() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(error = %e, "Stored session metadata is unreadable, clearing session");
                self.delete_all();
                return Ok(None);
            }
        };

        match (access_token, refresh_token, meta) {
            (Some(access_token), Some(refresh_token), Some(meta)) => Ok(Some(StoredSession {
                access_token,
                access_token_expires_at: meta.expires_at,
                refresh_token,
                user_id: meta.user_id,
                email: meta.email,
                display_name: meta.display_name,
            })),
            (None, None, None) => Ok(None),
            _ => {
                tracing::info!("Stored session is incomplete, clearing session");
                self.delete_all();
                Ok(None)
            }
        }
    }

    fn save(&self, session: &StoredSession) -> StorageResult<()> {
        let meta = SessionMeta {
            expires_at: session.access_token_expires_at,
            user_id: session.user_id.clone(),
            email: session.email.clone(),
            display_name: session.display_name.clone(),
        };
        let json =
            serde_json::to_string(&meta).map_err(|e| StorageError::Encoding(e.to_string()))?;

        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &session.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &session.refresh_token)?;
        self.storage.set(StorageKeys::SESSION_META, &json)?;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.delete_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileStorage, MemoryStorage};
    use chrono::Duration;
    use tempfile::tempdir;

    fn sample_session() -> StoredSession {
        StoredSession {
            access_token: "access-1".to_string(),
            access_token_expires_at: Utc::now() + Duration::minutes(15),
            refresh_token: "refresh-1".to_string(),
            user_id: Some("user-123".to_string()),
            email: Some("ada@example.com".to_string()),
            display_name: None,
        }
    }

    #[test]
    fn test_vault_empty_loads_none() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        assert!(vault.load().unwrap().is_none());
    }

    #[test]
    fn test_vault_save_then_load() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        let session = sample_session();

        vault.save(&session).unwrap();
        assert_eq!(vault.load().unwrap(), Some(session));
    }

    #[test]
    fn test_vault_clear() {
        let vault = SessionVault::new(Box::new(MemoryStorage::new()));
        vault.save(&sample_session()).unwrap();

        vault.clear().unwrap();
        assert!(vault.load().unwrap().is_none());
    }

    #[test]
    fn test_vault_incomplete_session_is_discarded() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::ACCESS_TOKEN, "orphan").unwrap();
        let vault = SessionVault::new(Box::new(storage));

        assert!(vault.load().unwrap().is_none());
        // A second load sees the cleaned-up state
        assert!(vault.load().unwrap().is_none());
    }

    #[test]
    fn test_vault_unreadable_meta_is_discarded() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::ACCESS_TOKEN, "a").unwrap();
        storage.set(StorageKeys::REFRESH_TOKEN, "r").unwrap();
        storage.set(StorageKeys::SESSION_META, "{broken").unwrap();
        let vault = SessionVault::new(Box::new(storage));

        assert!(vault.load().unwrap().is_none());
    }

    #[test]
    fn test_vault_over_file_storage_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let session = sample_session();

        SessionVault::new(Box::new(FileStorage::new(&path)))
            .save(&session)
            .unwrap();

        let reopened = SessionVault::new(Box::new(FileStorage::new(&path)));
        assert_eq!(reopened.load().unwrap(), Some(session));
    }
}

//! Storage key constants.

/// Storage keys used by the session vault
pub struct StorageKeys;

impl StorageKeys {
    /// Access token
    pub const ACCESS_TOKEN: &'static str = "authflow_access_token";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "authflow_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "authflow_session_meta";
}

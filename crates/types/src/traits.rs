//! Async traits shared across all chatvault crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `chatvault-types`, not on each other.

use crate::{CredentialRecord, WorkspaceId};
use async_trait::async_trait;
use std::time::Duration;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, crate::VaultError>;

/// Ephemeral key/value store with per-key time-to-live.
///
/// No durability and no atomicity across calls: a `has` followed by a `set`
/// may interleave with other writers. Entries may vanish at any time.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Return the value stored under `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key` for `ttl`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Return `true` if a live entry exists under `key`.
    async fn has(&self, key: &str) -> Result<bool>;
}

/// Durable credential storage keyed by workspace.
///
/// Implementations must provide single-key read-after-write consistency.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the current credential record for the workspace.
    async fn get_latest(&self, workspace: &WorkspaceId) -> Result<Option<CredentialRecord>>;
    /// Persist the record, fully overwriting any previous one.
    async fn put(&self, record: &CredentialRecord) -> Result<()>;
    /// Remove the workspace's record. Removing a missing record is not an error.
    async fn delete(&self, workspace: &WorkspaceId) -> Result<()>;
    /// Remove the workspace's record only if it still holds `access_token`.
    ///
    /// Returns `true` if a row was removed.
    async fn delete_if_unchanged(&self, workspace: &WorkspaceId, access_token: &str)
    -> Result<bool>;
}

/// Parameters of a `grant_type=refresh_token` request.
#[derive(Clone)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` means the previous refresh token remains valid.
    pub refresh_token: Option<String>,
    /// `None` means the new credential never expires.
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub bot_user_id: Option<String>,
    pub workspace_id: Option<String>,
    pub workspace_name: Option<String>,
}

/// Exchanges a refresh token for a new credential set at the authorization server.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform the refresh. Any non-success outcome is a
    /// [`VaultError::RefreshFailed`](crate::VaultError::RefreshFailed).
    async fn refresh(&self, request: &RefreshRequest) -> Result<TokenGrant>;
}

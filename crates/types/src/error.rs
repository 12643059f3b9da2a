//! Unified error type for the chatvault workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across chatvault crates.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No credential record exists for the workspace, or it was collected
    /// after expiring without a refresh token.
    #[error("no credential found for workspace: {0}")]
    NoCredentialFound(crate::WorkspaceId),

    /// The stored credential has expired and carries no refresh token.
    #[error("credential expired and cannot be refreshed for workspace: {0}")]
    CredentialExpiredNoRefresh(crate::WorkspaceId),

    /// The authorization server rejected or failed the refresh request.
    #[error("credential refresh failed: {code}{}", status.map(|s| format!(" (status={s})")).unwrap_or_default())]
    RefreshFailed { code: String, status: Option<u16> },

    /// Durable credential store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Ephemeral cache backend error.
    #[error("cache error: {0}")]
    Cache(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for VaultError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for VaultError {
    fn from(e: redis::RedisError) -> Self {
        Self::Cache(e.to_string())
    }
}

impl VaultError {
    /// Returns `true` if the workspace has to be re-authorized (re-installed)
    /// before any credential can be served again.
    #[must_use]
    pub fn needs_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::NoCredentialFound(_) | Self::CredentialExpiredNoRefresh(_)
        )
    }

    /// Builds a [`VaultError::RefreshFailed`] from an error code and optional status.
    pub fn refresh_failed(code: impl Into<String>, status: Option<u16>) -> Self {
        Self::RefreshFailed {
            code: code.into(),
            status,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VaultError>;

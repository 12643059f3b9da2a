//! Bot credential lifecycle for installed workspaces.
//!
//! Responsibilities:
//! - Serve a valid access token from the cache, falling back to the durable store.
//! - Refresh ahead of expiry using a safety buffer.
//! - Debounce concurrent refreshes through a short-lived marker in the shared cache.
//! - Lazily collect records that expired without a refresh token.
//!
//! Callers are stateless and may run in separate processes; everything shared
//! lives in the [`Cache`] and the [`CredentialStore`].
use crate::marker::DebounceMarker;
use chatvault_config::LifecycleConfig;
use chatvault_types::{
    Cache, CredentialRecord, CredentialStatus, CredentialStore, RefreshRequest, TokenGrant,
    TokenRefresher, VaultError, WorkspaceId, now_secs, traits::Result,
};
use std::{sync::Arc, time::Duration};

/// Tunables of the [`TokenManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Cache TTL for records without a hint, and after a refresh.
    pub default_cache_ttl: Duration,
    /// Refresh buffer for records without a cache hint.
    pub default_refresh_buffer_secs: u64,
    /// How long the debounce marker stays raised after a refresh.
    pub debounce_window: Duration,
    /// Single pause taken when another refresh is in flight.
    pub debounce_wait: Duration,
    pub refresh_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for ManagerSettings {
    fn from(c: &LifecycleConfig) -> Self {
        Self {
            default_cache_ttl: Duration::from_secs(c.default_cache_ttl_secs),
            default_refresh_buffer_secs: c.refresh_interval_secs / 3,
            debounce_window: Duration::from_secs(c.debounce_window_secs),
            debounce_wait: Duration::from_millis(c.debounce_wait_millis),
            refresh_timeout: Duration::from_secs(c.refresh_timeout_secs),
        }
    }
}

pub struct TokenManager {
    cache: Arc<dyn Cache>,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    marker: DebounceMarker,
    settings: ManagerSettings,
}

impl TokenManager {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            marker: DebounceMarker::new(Arc::clone(&cache)),
            cache,
            store,
            refresher,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Return a currently valid bot access token for the workspace,
    /// refreshing it first when it is inside the refresh window.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NoCredentialFound`] if no usable record exists.
    /// - [`VaultError::CredentialExpiredNoRefresh`] if the record expired and
    ///   carries no refresh token.
    /// - [`VaultError::RefreshFailed`] if the authorization server rejected the
    ///   refresh or did not answer in time.
    /// - Durable store errors on the read path, as-is.
    pub async fn get_valid_access_token(
        &self,
        workspace: &WorkspaceId,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String> {
        let record = self
            .fetch_record(workspace)
            .await?
            .ok_or_else(|| VaultError::NoCredentialFound(workspace.clone()))?;

        let buffer = record.refresh_buffer(self.settings.default_refresh_buffer_secs);
        if !record.is_expired(buffer) {
            return Ok(record.access_token);
        }

        let Some(refresh_token) = record.refresh_token.clone() else {
            tracing::info!(workspace = %workspace, "credential expired without refresh token");
            return Err(VaultError::CredentialExpiredNoRefresh(workspace.clone()));
        };

        if self.marker.is_raised(workspace).await {
            tracing::debug!(
                workspace = %workspace,
                wait = ?self.settings.debounce_wait,
                "refresh already in flight, waiting once"
            );
            tokio::time::sleep(self.settings.debounce_wait).await;
            return self
                .fetch_record(workspace)
                .await?
                .map(|r| r.access_token)
                .ok_or_else(|| VaultError::NoCredentialFound(workspace.clone()));
        }

        let request = RefreshRequest {
            refresh_token,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };
        self.refresh(&record, &request).await
    }

    /// Load the record from the cache, or from the durable store on a miss.
    ///
    /// Cache hits are returned without an expiry check. On a miss, a record
    /// that is expired within its refresh buffer and has no refresh token is
    /// deleted and reported absent; otherwise it is projected into the cache.
    ///
    /// # Errors
    ///
    /// Returns durable store errors. Cache errors degrade to a miss.
    pub async fn fetch_record(&self, workspace: &WorkspaceId) -> Result<Option<CredentialRecord>> {
        if let Some(record) = self.cached_record(workspace).await {
            return Ok(Some(record));
        }

        let Some(record) = self.store.get_latest(workspace).await? else {
            return Ok(None);
        };

        if self.is_collectable(&record) {
            let removed = self
                .store
                .delete_if_unchanged(workspace, &record.access_token)
                .await?;
            if removed {
                tracing::info!(workspace = %workspace, "deleted expired non-refreshable credential");
                return Ok(None);
            }
            // Replaced between our read and the delete; take the new one.
            return Ok(self
                .store
                .get_latest(workspace)
                .await?
                .filter(|r| !self.is_collectable(r)));
        }

        let ttl = record.cache_ttl(self.settings.default_cache_ttl);
        self.cache_record(&record, ttl).await;
        Ok(Some(record))
    }

    /// Persist a refreshed record, project it into the cache, and hold the
    /// debounce marker for the debounce window.
    ///
    /// The marker is not lowered on success, so callers that raced the
    /// refresh wait and pick up this record instead of refreshing again.
    ///
    /// # Errors
    ///
    /// Returns the durable store error if the write fails.
    pub async fn update_record(&self, record: &CredentialRecord) -> Result<()> {
        self.store.put(record).await?;
        self.cache_record(record, self.settings.default_cache_ttl)
            .await;
        if let Err(e) = self
            .marker
            .raise(&record.workspace_id, self.settings.debounce_window)
            .await
        {
            tracing::warn!(workspace = %record.workspace_id, error = %e, "failed to raise debounce marker");
        }
        Ok(())
    }

    /// Store a credential obtained from a fresh installation, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// Returns the durable store error if the write fails.
    pub async fn save_installation(&self, record: &CredentialRecord) -> Result<()> {
        self.store.put(record).await?;
        let ttl = record.cache_ttl(self.settings.default_cache_ttl);
        self.cache_record(record, ttl).await;
        Ok(())
    }

    /// Remove the durable record. The cached projection lapses on its own.
    ///
    /// # Errors
    ///
    /// Returns the durable store error if the delete fails.
    pub async fn delete_record(&self, workspace: &WorkspaceId) -> Result<()> {
        self.store.delete(workspace).await
    }

    /// Classify the durable record for operators. Does not touch the cache.
    ///
    /// # Errors
    ///
    /// Returns the durable store error if the read fails.
    pub async fn status(&self, workspace: &WorkspaceId) -> Result<CredentialStatus> {
        Ok(match self.store.get_latest(workspace).await? {
            Some(record) => record.status_at(now_secs(), self.settings.default_refresh_buffer_secs),
            None => CredentialStatus::Missing,
        })
    }

    /// Whether a cached projection currently exists. Cache errors read as `false`.
    pub async fn is_cached(&self, workspace: &WorkspaceId) -> bool {
        self.cache
            .has(&workspace.credential_cache_key())
            .await
            .unwrap_or(false)
    }

    async fn refresh(&self, record: &CredentialRecord, request: &RefreshRequest) -> Result<String> {
        let workspace = &record.workspace_id;

        // Best-effort: narrows, but does not close, the window in which a
        // second caller can start its own refresh.
        if let Err(e) = self
            .marker
            .raise(workspace, self.settings.debounce_window)
            .await
        {
            tracing::warn!(workspace = %workspace, error = %e, "failed to raise debounce marker");
        }

        tracing::info!(workspace = %workspace, "refreshing credential");
        let outcome = tokio::time::timeout(
            self.settings.refresh_timeout,
            self.refresher.refresh(request),
        )
        .await
        .unwrap_or_else(|_| Err(VaultError::refresh_failed("timeout", None)));

        match outcome {
            Ok(grant) => {
                let refreshed = apply_grant(record, grant);
                if let Err(e) = self.update_record(&refreshed).await {
                    // The old refresh token may already be revoked; keep the
                    // rotated one reachable for the cache TTL.
                    self.cache_record(&refreshed, self.settings.default_cache_ttl)
                        .await;
                    tracing::error!(workspace = %workspace, error = %e, "failed to persist refreshed credential");
                    return Err(e);
                }
                tracing::info!(
                    workspace = %workspace,
                    expires_at = ?refreshed.expires_at,
                    "credential refreshed"
                );
                Ok(refreshed.access_token)
            }
            Err(e) => {
                if let Err(clear_err) = self.marker.clear(workspace).await {
                    tracing::warn!(workspace = %workspace, error = %clear_err, "failed to clear debounce marker");
                }
                tracing::warn!(workspace = %workspace, error = %e, "credential refresh failed");
                Err(match e {
                    VaultError::RefreshFailed { .. } => e,
                    other => VaultError::refresh_failed(other.to_string(), None),
                })
            }
        }
    }

    /// Expired within its refresh buffer and impossible to renew.
    fn is_collectable(&self, record: &CredentialRecord) -> bool {
        let buffer = record.refresh_buffer(self.settings.default_refresh_buffer_secs);
        record.is_expired(buffer) && !record.is_refreshable()
    }

    async fn cached_record(&self, workspace: &WorkspaceId) -> Option<CredentialRecord> {
        let raw = match self.cache.get(&workspace.credential_cache_key()).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(workspace = %workspace, error = %e, "cache read failed, using store");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(workspace = %workspace, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn cache_record(&self, record: &CredentialRecord, ttl: Duration) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(workspace = %record.workspace_id, error = %e, "failed to encode credential for cache");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(&record.workspace_id.credential_cache_key(), &json, ttl)
            .await
        {
            tracing::warn!(workspace = %record.workspace_id, error = %e, "cache write failed");
        }
    }
}


/// Build the replacement record from a refresh grant. Omitted fields carry
/// over from `previous`, except the expiry: no `expires_in` means the new
/// credential never expires.
fn apply_grant(previous: &CredentialRecord, grant: TokenGrant) -> CredentialRecord {
    CredentialRecord {
        workspace_id: previous.workspace_id.clone(),
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.or_else(|| previous.refresh_token.clone()),
        expires_at: grant.expires_in.map(|secs| now_secs().saturating_add(secs)),
        scope: grant.scope.or_else(|| previous.scope.clone()),
        bot_user_id: grant.bot_user_id.or_else(|| previous.bot_user_id.clone()),
        workspace_name: grant
            .workspace_name
            .or_else(|| previous.workspace_name.clone()),
        cache_ttl_hint: grant.expires_in,
    }
}

//! Refresh debounce marker.
//!
//! A short-lived boolean flag in the shared cache meaning "a refresh for this
//! workspace is in flight or has just completed". It is a soft window, not a
//! lock: checking and raising it are separate cache calls, so two callers can
//! both find it lowered and both refresh.

use chatvault_types::{Cache, WorkspaceId, traits::Result};
use std::sync::Arc;
use std::time::Duration;

const RAISED: &str = "true";
const LOWERED: &str = "false";

/// TTL of a lowered marker; short so the key disappears quickly.
pub const CLEAR_TTL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct DebounceMarker {
    cache: Arc<dyn Cache>,
}

impl DebounceMarker {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Whether the marker is currently raised. Cache failures read as lowered.
    pub async fn is_raised(&self, workspace: &WorkspaceId) -> bool {
        match self.cache.get(&workspace.marker_cache_key()).await {
            Ok(value) => value.as_deref() == Some(RAISED),
            Err(e) => {
                tracing::warn!(workspace = %workspace, error = %e, "debounce marker read failed");
                false
            }
        }
    }

    /// Raise the marker for `window`.
    ///
    /// # Errors
    ///
    /// Returns the cache backend error; callers treat it as best-effort.
    pub async fn raise(&self, workspace: &WorkspaceId, window: Duration) -> Result<()> {
        self.cache
            .set(&workspace.marker_cache_key(), RAISED, window)
            .await
    }

    /// Lower the marker so the next caller may refresh right away.
    ///
    /// # Errors
    ///
    /// Returns the cache backend error; callers treat it as best-effort.
    pub async fn clear(&self, workspace: &WorkspaceId) -> Result<()> {
        self.cache
            .set(&workspace.marker_cache_key(), LOWERED, CLEAR_TTL)
            .await
    }
}

//! In-memory credential store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use chatvault_types::{CredentialRecord, CredentialStore, WorkspaceId, traits::Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// An in-memory [`CredentialStore`] implementation for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    /// Workspace-keyed record map.
    data: Mutex<HashMap<WorkspaceId, CredentialRecord>>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> std::sync::MutexGuard<'_, HashMap<WorkspaceId, CredentialRecord>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_latest(&self, workspace: &WorkspaceId) -> Result<Option<CredentialRecord>> {
        Ok(self.data().get(workspace).cloned())
    }

    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        self.data()
            .insert(record.workspace_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, workspace: &WorkspaceId) -> Result<()> {
        self.data().remove(workspace);
        Ok(())
    }

    async fn delete_if_unchanged(
        &self,
        workspace: &WorkspaceId,
        access_token: &str,
    ) -> Result<bool> {
        let mut data = self.data();
        match data.get(workspace) {
            Some(current) if current.access_token == access_token => {
                data.remove(workspace);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(id: &str) -> WorkspaceId {
        WorkspaceId::new(id)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryCredentialStore::new();
        let record = CredentialRecord::new(ws("T1"), "xoxb-1");
        store.put(&record).await.unwrap();
        let loaded = store.get_latest(&ws("T1")).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "xoxb-1");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get_latest(&ws("T1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryCredentialStore::new();
        store
            .put(&CredentialRecord::new(ws("T1"), "first").with_refresh("r"))
            .await
            .unwrap();
        store
            .put(&CredentialRecord::new(ws("T1"), "second"))
            .await
            .unwrap();
        let loaded = store.get_latest(&ws("T1")).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
        assert!(loaded.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryCredentialStore::new();
        store
            .put(&CredentialRecord::new(ws("T1"), "tok"))
            .await
            .unwrap();
        store.delete(&ws("T1")).await.unwrap();
        store.delete(&ws("T1")).await.unwrap();
        assert!(store.get_latest(&ws("T1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_if_unchanged() {
        let store = InMemoryCredentialStore::new();
        store
            .put(&CredentialRecord::new(ws("T1"), "new"))
            .await
            .unwrap();
        assert!(!store.delete_if_unchanged(&ws("T1"), "old").await.unwrap());
        assert!(store.get_latest(&ws("T1")).await.unwrap().is_some());
        assert!(store.delete_if_unchanged(&ws("T1"), "new").await.unwrap());
        assert!(!store.delete_if_unchanged(&ws("T1"), "new").await.unwrap());
    }
}

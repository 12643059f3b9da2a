//! Workspace identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an installed chat workspace (e.g. `T024BE7LD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the cached credential projection for this workspace.
    #[must_use]
    pub fn credential_cache_key(&self) -> String {
        format!("credential:{}", self.0)
    }

    /// Key of the refresh debounce marker for this workspace.
    #[must_use]
    pub fn marker_cache_key(&self) -> String {
        format!("refresh-marker:{}", self.0)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WorkspaceId {
    type Err = crate::VaultError;

    /// Parse a workspace identifier, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`](crate::VaultError::Config) if the string is empty
    /// or contains whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(crate::VaultError::Config(format!(
                "invalid workspace id: {s:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_distinct() {
        let ws = WorkspaceId::new("T42");
        assert_eq!(ws.credential_cache_key(), "credential:T42");
        assert_eq!(ws.marker_cache_key(), "refresh-marker:T42");
    }

    #[test]
    fn test_parse_trims() {
        let ws: WorkspaceId = "  T42 ".parse().unwrap();
        assert_eq!(ws.as_str(), "T42");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!("".parse::<WorkspaceId>().is_err());
        assert!("T 42".parse::<WorkspaceId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&WorkspaceId::new("T42")).unwrap();
        assert_eq!(json, "\"T42\"");
    }
}

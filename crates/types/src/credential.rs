//! Credential record representation and expiry logic.

use crate::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fraction of the cache TTL hint actually used when projecting a record
/// into the cache, so the cached copy lapses well before the credential.
pub const CACHE_TTL_HINT_FACTOR: f64 = 0.6;

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// The bot credential set retained for one installed workspace.
///
/// Exactly one record exists per workspace; a new installation or a refresh
/// overwrites it in full. `expires_at == None` and `cache_ttl_hint == None`
/// both mean "never".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub workspace_id: WorkspaceId,
    pub access_token: String,
    /// Present only when the authorization server issues rotating credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    /// Seconds this record may live in the ephemeral cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hint: Option<u64>,
}

impl CredentialRecord {
    /// Create a perpetual (non-expiring, non-refreshable) record.
    pub fn new(workspace_id: WorkspaceId, access_token: impl Into<String>) -> Self {
        Self {
            workspace_id,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            bot_user_id: None,
            workspace_name: None,
            cache_ttl_hint: None,
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now and use the same
    /// lifetime as the cache TTL hint.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(now_secs().saturating_add(expires_in_secs));
        self.cache_ttl_hint = Some(expires_in_secs);
        self
    }

    /// Set an absolute expiry (epoch seconds) without touching the cache hint.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns `true` when `now >= expires_at - buffer_secs`.
    ///
    /// Records without an expiry never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: u64, buffer_secs: u64) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        now >= expires_at.saturating_sub(buffer_secs)
    }

    /// [`is_expired_at`](Self::is_expired_at) against the system clock.
    #[must_use]
    pub fn is_expired(&self, buffer_secs: u64) -> bool {
        self.is_expired_at(now_secs(), buffer_secs)
    }

    /// Safety margin used to refresh ahead of expiry: one third of the
    /// record's cache hint, or `default_secs` when it carries none.
    #[must_use]
    pub fn refresh_buffer(&self, default_secs: u64) -> u64 {
        self.cache_ttl_hint.map_or(default_secs, |hint| hint / 3)
    }

    /// TTL for the cached projection of this record.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn cache_ttl(&self, default: Duration) -> Duration {
        match self.cache_ttl_hint {
            Some(hint) => Duration::from_secs((hint as f64 * CACHE_TTL_HINT_FACTOR) as u64),
            None => default,
        }
    }

    /// Classify the record for operators, evaluated at `now`.
    #[must_use]
    pub fn status_at(&self, now: u64, default_buffer_secs: u64) -> CredentialStatus {
        if self.is_expired_at(now, self.refresh_buffer(default_buffer_secs)) {
            if self.is_refreshable() {
                CredentialStatus::NeedsRefresh
            } else {
                CredentialStatus::Expired
            }
        } else {
            CredentialStatus::Valid
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("workspace_id", &self.workspace_id)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("bot_user_id", &self.bot_user_id)
            .field("workspace_name", &self.workspace_name)
            .field("cache_ttl_hint", &self.cache_ttl_hint)
            .finish()
    }
}

/// Describes the usability of a stored [`CredentialRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No record is stored for the workspace.
    Missing,
    Valid,
    /// Inside the refresh window (or past expiry) with a refresh token available.
    NeedsRefresh,
    /// Inside the refresh window (or past expiry) with no way to renew.
    Expired,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Valid => write!(f, "valid"),
            Self::NeedsRefresh => write!(f, "needs refresh"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> WorkspaceId {
        WorkspaceId::new("T1")
    }

    fn expiring_at(ts: u64) -> CredentialRecord {
        CredentialRecord::new(ws(), "xoxe.xoxb-1").with_expires_at(ts)
    }

    #[test]
    fn test_with_expiry_saturates() {
        let record = CredentialRecord::new(ws(), "t").with_expiry(u64::MAX);
        assert_eq!(record.expires_at, Some(u64::MAX));
        assert!(!record.is_expired(0));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let r = CredentialRecord::new(ws(), "tok");
        for now in [0, 1_000, u64::MAX] {
            for buffer in [0, 60, u64::MAX] {
                assert!(!r.is_expired_at(now, buffer));
            }
        }
    }

    #[test]
    fn test_expired_boundary() {
        let r = expiring_at(1_000);
        assert!(!r.is_expired_at(999, 0));
        assert!(r.is_expired_at(1_000, 0));
        assert!(!r.is_expired_at(939, 60));
        assert!(r.is_expired_at(940, 60));
    }

    #[test]
    fn test_larger_buffer_only_turns_false_into_true() {
        let r = expiring_at(10_000);
        for now in (0..12_000).step_by(250) {
            let mut seen_expired = false;
            for buffer in (0..12_000).step_by(250) {
                let expired = r.is_expired_at(now, buffer);
                assert!(!seen_expired || expired, "now={now} buffer={buffer}");
                seen_expired |= expired;
            }
        }
    }

    #[test]
    fn test_buffer_larger_than_expiry_saturates() {
        let r = expiring_at(100);
        assert!(r.is_expired_at(0, 1_000));
    }

    #[test]
    fn test_refresh_buffer_uses_hint() {
        let r = CredentialRecord::new(ws(), "tok").with_expiry(43_200);
        assert_eq!(r.refresh_buffer(5), 14_400);
        let no_hint = expiring_at(1);
        assert_eq!(no_hint.refresh_buffer(5), 5);
    }

    #[test]
    fn test_cache_ttl_scales_hint() {
        let mut r = CredentialRecord::new(ws(), "tok");
        assert_eq!(r.cache_ttl(Duration::from_secs(600)), Duration::from_secs(600));
        r.cache_ttl_hint = Some(1_000);
        assert_eq!(r.cache_ttl(Duration::from_secs(600)), Duration::from_secs(600));
        r.cache_ttl_hint = Some(43_200);
        assert_eq!(
            r.cache_ttl(Duration::from_secs(600)),
            Duration::from_secs(25_920)
        );
    }

    #[test]
    fn test_status_at() {
        let now = 50_000;
        assert_eq!(
            CredentialRecord::new(ws(), "t").status_at(now, 100),
            CredentialStatus::Valid
        );
        assert_eq!(expiring_at(now + 1_000).status_at(now, 100), CredentialStatus::Valid);
        assert_eq!(expiring_at(now + 50).status_at(now, 100), CredentialStatus::Expired);
        assert_eq!(
            expiring_at(now - 1).with_refresh("r").status_at(now, 100),
            CredentialStatus::NeedsRefresh
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let r = CredentialRecord::new(ws(), "xoxb-secret").with_refresh("xoxe-secret");
        let s = format!("{r:?}");
        assert!(!s.contains("xoxb-secret"));
        assert!(!s.contains("xoxe-secret"));
        assert!(s.contains("T1"));
    }

    #[test]
    fn test_serde_skips_none() {
        let r = CredentialRecord::new(ws(), "tok");
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("expires_at"));
        let back: CredentialRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}

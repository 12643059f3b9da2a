//! Workspace installation: exchange an OAuth authorization code for the
//! workspace's bot credential and persist it.

use crate::{TokenManager, refresh::HttpRefresher};
use chatvault_types::{
    CredentialRecord, TokenGrant, VaultError, WorkspaceId, now_secs, traits::Result,
};

/// Build the form parameters of an authorization code exchange.
#[must_use]
pub fn build_code_exchange_params(
    code: &str,
    redirect_uri: Option<&str>,
    client_id: &str,
    client_secret: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("client_id", client_id.to_string()),
        ("client_secret", client_secret.to_string()),
    ];
    if let Some(uri) = redirect_uri {
        params.push(("redirect_uri", uri.to_string()));
    }
    params
}

/// Turn a code exchange grant into the workspace's credential record.
///
/// # Errors
///
/// Returns [`VaultError::Config`] if the grant does not name the installing
/// workspace.
pub fn record_from_grant(grant: TokenGrant) -> Result<CredentialRecord> {
    let workspace_id = grant
        .workspace_id
        .map(WorkspaceId::new)
        .ok_or_else(|| VaultError::Config("code exchange response has no team id".into()))?;

    Ok(CredentialRecord {
        workspace_id,
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        expires_at: grant.expires_in.map(|secs| now_secs().saturating_add(secs)),
        scope: grant.scope,
        bot_user_id: grant.bot_user_id,
        workspace_name: grant.workspace_name,
        cache_ttl_hint: grant.expires_in,
    })
}

/// Complete an installation: exchange `code`, then store the credential.
///
/// # Errors
///
/// Returns [`VaultError::Http`] if the exchange is rejected, or the store error
/// if the record cannot be persisted.
pub async fn complete_installation(
    manager: &TokenManager,
    endpoint: &HttpRefresher,
    code: &str,
    redirect_uri: Option<&str>,
    client_id: &str,
    client_secret: &str,
) -> Result<CredentialRecord> {
    let params = build_code_exchange_params(code, redirect_uri, client_id, client_secret);
    let grant = endpoint.post_form(&params).await.map_err(|e| match e {
        VaultError::RefreshFailed { code, status } => VaultError::Http(match status {
            Some(status) => format!("code exchange failed: {code} (status={status})"),
            None => format!("code exchange failed: {code}"),
        }),
        other => other,
    })?;
    let record = record_from_grant(grant)?;
    manager.save_installation(&record).await?;
    tracing::info!(
        workspace = %record.workspace_id,
        rotating = record.is_refreshable(),
        "workspace installed"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_exchange_params() {
        let params = build_code_exchange_params("c0de", Some("https://x/cb"), "id", "secret");
        assert!(params.contains(&("grant_type", "authorization_code".into())));
        assert!(params.contains(&("code", "c0de".into())));
        assert!(params.contains(&("redirect_uri", "https://x/cb".into())));

        let params = build_code_exchange_params("c0de", None, "id", "secret");
        assert!(!params.iter().any(|(k, _)| *k == "redirect_uri"));
    }

    #[test]
    fn test_record_from_rotating_grant() {
        let record = record_from_grant(TokenGrant {
            access_token: "xoxe.xoxb-1".into(),
            refresh_token: Some("xoxe-1".into()),
            expires_in: Some(43_200),
            workspace_id: Some("T1".into()),
            workspace_name: Some("Acme".into()),
            ..TokenGrant::default()
        })
        .unwrap();
        assert_eq!(record.workspace_id.as_str(), "T1");
        assert_eq!(record.cache_ttl_hint, Some(43_200));
        assert!(record.expires_at.unwrap() >= now_secs() + 43_000);
        assert!(record.is_refreshable());
    }

    #[test]
    fn test_record_from_perpetual_grant() {
        let record = record_from_grant(TokenGrant {
            access_token: "xoxb-1".into(),
            workspace_id: Some("T1".into()),
            ..TokenGrant::default()
        })
        .unwrap();
        assert!(record.expires_at.is_none());
        assert!(record.cache_ttl_hint.is_none());
    }

    #[test]
    fn test_record_expiry_saturates() {
        let record = record_from_grant(TokenGrant {
            access_token: "xoxe.xoxb-1".into(),
            refresh_token: Some("xoxe-1".into()),
            expires_in: Some(u64::MAX),
            workspace_id: Some("T1".into()),
            ..TokenGrant::default()
        })
        .unwrap();
        assert_eq!(record.expires_at, Some(u64::MAX));
        assert!(!record.is_expired(0));
    }

    #[test]
    fn test_record_requires_team() {
        let err = record_from_grant(TokenGrant {
            access_token: "xoxb-1".into(),
            ..TokenGrant::default()
        })
        .unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }
}

//! Token endpoint client: `grant_type=refresh_token` requests and response parsing.
//!
//! The endpoint answers with a JSON object carrying an `ok` flag. A non-2xx
//! status, `ok: false`, or a missing `access_token` are all refresh failures
//! carrying the server's `error` code.

use async_trait::async_trait;
use chatvault_types::{
    RefreshRequest, TokenGrant, TokenRefresher, VaultError, traits::Result,
};
use serde_json::Value;
use std::time::Duration;

/// Fallback error code when the endpoint gives none.
const UNKNOWN_ERROR: &str = "unknown_error";

/// Build the form parameters of a refresh request.
#[must_use]
pub fn build_refresh_params(request: &RefreshRequest) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".into()),
        ("refresh_token", request.refresh_token.clone()),
        ("client_id", request.client_id.clone()),
        ("client_secret", request.client_secret.clone()),
    ]
}

fn str_field(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn error_code(json: &Value) -> String {
    str_field(json, "error").unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// Read `expires_in` as whole seconds. Integers, integral floats and numeric
/// strings are accepted; anything else present is rejected rather than read
/// as "never expires".
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn expires_in(json: &Value) -> Result<Option<u64>> {
    let invalid = || VaultError::refresh_failed("invalid_expires_in", None);
    match json.get("expires_in") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(secs), _) => Ok(Some(secs)),
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                Ok(Some(f as u64))
            }
            _ => Err(invalid()),
        },
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Parse a token endpoint JSON body into a [`TokenGrant`].
///
/// # Errors
///
/// Returns [`VaultError::RefreshFailed`] when `ok` is `false`, the
/// `access_token` field is missing, or `expires_in` is not a number of
/// seconds.
pub fn parse_token_response(json: &Value) -> Result<TokenGrant> {
    if json.get("ok").and_then(Value::as_bool) == Some(false) {
        return Err(VaultError::refresh_failed(error_code(json), None));
    }
    let access_token = str_field(json, "access_token").ok_or_else(|| {
        VaultError::refresh_failed(
            str_field(json, "error").unwrap_or_else(|| "missing_access_token".into()),
            None,
        )
    })?;

    let team = json.get("team");
    Ok(TokenGrant {
        access_token,
        refresh_token: str_field(json, "refresh_token"),
        expires_in: expires_in(json)?,
        scope: str_field(json, "scope"),
        bot_user_id: str_field(json, "bot_user_id"),
        workspace_id: team.and_then(|t| str_field(t, "id")),
        workspace_name: team.and_then(|t| str_field(t, "name")),
    })
}

/// [`TokenRefresher`] that talks to the authorization server over HTTP.
#[derive(Clone)]
pub struct HttpRefresher {
    http: rquest::Client,
    token_url: String,
}

impl HttpRefresher {
    pub fn new(http: rquest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    /// Build a refresher with its own HTTP client whose requests are bounded
    /// by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Http`] if the HTTP client cannot be built.
    pub fn with_timeout(token_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = rquest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(http, token_url))
    }

    /// POST a form to the token endpoint and parse the grant.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::RefreshFailed`] for transport errors, non-2xx
    /// statuses, unparsable bodies, and failure payloads.
    pub async fn post_form(&self, params: &[(&str, String)]) -> Result<TokenGrant> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| VaultError::Http(format!("failed to encode form: {e}")))?;

        let resp = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| VaultError::refresh_failed(format!("transport: {e}"), None))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| VaultError::refresh_failed(format!("transport: {e}"), Some(status.as_u16())))?;
        let json = serde_json::from_str::<Value>(&text).ok();

        if !status.is_success() {
            let code = json
                .as_ref()
                .and_then(|j| str_field(j, "error"))
                .unwrap_or(text);
            return Err(VaultError::refresh_failed(code, Some(status.as_u16())));
        }

        let json = json.ok_or_else(|| {
            VaultError::refresh_failed("invalid_response", Some(status.as_u16()))
        })?;
        parse_token_response(&json).map_err(|e| match e {
            VaultError::RefreshFailed { code, .. } => {
                VaultError::refresh_failed(code, Some(status.as_u16()))
            }
            other => other,
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, request: &RefreshRequest) -> Result<TokenGrant> {
        tracing::debug!(client_id = %request.client_id, "requesting credential refresh");
        self.post_form(&build_refresh_params(request)).await
    }
}

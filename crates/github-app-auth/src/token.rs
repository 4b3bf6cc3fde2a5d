//! Installation access tokens.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::api;
use crate::error::AuthError;
use crate::options::TransportOption;
use crate::signer::Signer;
use crate::transport::{bearer_header, join_segments, ReqwestRoundTripper, RoundTripper, Transport};

/// A scoped installation access token issued by the platform.
///
/// Values are produced by
/// [`Transport::installation_token`](crate::transport::Transport::installation_token)
/// with metadata filled in from the transport. The token string is opaque
/// and never appears in debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct InstallationToken {
    /// Access token, typically starting with `ghs_`.
    pub token: String,

    /// App id the token belongs to.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub app_id: u64,

    /// App slug.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    /// Installation the token is bound to.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub installation_id: u64,

    /// API endpoint the token was minted against, also used to revoke it.
    /// When empty the default endpoint is assumed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// User-Agent header used when minting, reused for revocation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,

    /// Expiry instant. `None` means the expiry is unknown and the token is
    /// treated as still usable.
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Installation owner login.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    /// Repositories the token can reach. Empty means every repository
    /// accessible to the installation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,

    /// Permissions attached to the token. Empty means everything granted
    /// to the installation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub permissions: BTreeMap<String, String>,

    /// Username of the app's bot user.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bot_username: String,

    /// No-reply email attributing commits to the bot user, in the form
    /// `<user-id>+<login>@users.noreply.github.com`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bot_committer_email: String,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl InstallationToken {
    /// Check that the token is usable now and for at least another minute.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// [`is_valid`](Self::is_valid) against an explicit instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty()
            && self
                .expires_at
                .map_or(true, |expires_at| expires_at > now + Duration::seconds(60))
    }

    /// Revoke the token with the server that minted it.
    ///
    /// On success the local record is stamped expired so it immediately
    /// reads as invalid. The token must still be valid to be revoked.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InstallationToken`] when the token is already
    /// invalid, the stored server URL is unusable, or the server answers
    /// with anything other than 204.
    pub async fn revoke(&mut self) -> Result<(), AuthError> {
        let round_tripper = ReqwestRoundTripper::new(reqwest::Client::builder().build()?);
        self.revoke_with(&round_tripper).await
    }

    /// [`revoke`](Self::revoke) through an explicit transport.
    #[instrument(skip_all, fields(installation_id = self.installation_id))]
    pub(crate) async fn revoke_with(
        &mut self,
        round_tripper: &dyn RoundTripper,
    ) -> Result<(), AuthError> {
        if !self.is_valid() {
            return Err(AuthError::InstallationToken {
                message: "cannot revoke an already invalid token".to_string(),
            });
        }

        let server = if self.server.is_empty() {
            api::DEFAULT_ENDPOINT
        } else {
            &self.server
        };
        let server_url = Url::parse(server).map_err(|e| AuthError::InstallationToken {
            message: format!("invalid server url: {e}"),
        })?;
        match server_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AuthError::InstallationToken {
                    message: format!("invalid server url scheme: {scheme} ({server})"),
                });
            }
        }
        if !server_url.fragment().unwrap_or("").is_empty()
            || !server_url.query().unwrap_or("").is_empty()
        {
            return Err(AuthError::InstallationToken {
                message: format!("server url cannot have fragments or queries: {server}"),
            });
        }

        let url = join_segments(&server_url, &["installation", "token"])?;
        let user_agent = if self.user_agent.is_empty() {
            api::USER_AGENT_VALUE
        } else {
            &self.user_agent
        };
        let request = http::Request::builder()
            .method(Method::DELETE)
            .uri(url.as_str())
            .header(AUTHORIZATION, bearer_header(&self.token)?)
            .header(ACCEPT, HeaderValue::from_static(api::ACCEPT_VALUE))
            .header(
                HeaderName::from_static(api::API_VERSION_HEADER),
                HeaderValue::from_static(api::API_VERSION_VALUE),
            )
            .header(
                USER_AGENT,
                HeaderValue::from_str(user_agent).map_err(|_| AuthError::InstallationToken {
                    message: "user agent contains invalid header characters".to_string(),
                })?,
            )
            .body(Bytes::new())
            .map_err(|e| AuthError::InstallationToken {
                message: format!("failed to build revoke request: {e}"),
            })?;

        let response = round_tripper.round_trip(request).await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(AuthError::InstallationToken {
                message: format!(
                    "failed to revoke token, expected(204) but got {}",
                    response.status()
                ),
            });
        }

        // The platform forgot the token; make the local record agree.
        self.expires_at = Some(Utc::now());
        Ok(())
    }
}

// The access token never appears in debug output.
impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("server", &self.server)
            .field("app_id", &self.app_id)
            .field("app_name", &self.app_name)
            .field("installation_id", &self.installation_id)
            .field("user_agent", &self.user_agent)
            .field("exp", &self.expires_at)
            .field("owner", &self.owner)
            .field("repositories", &self.repositories)
            .field("permissions", &self.permissions)
            .field("bot_username", &self.bot_username)
            .field("bot_committer_email", &self.bot_committer_email)
            .field("token", &"REDACTED")
            .finish()
    }
}

/// Construct a transport and return its first installation token.
///
/// Takes the same options as [`Transport::new`]. Convenient when only the
/// token is needed, for example to hand to a separate API client or a git
/// credential helper.
pub async fn new_installation_token(
    app_id: u64,
    signer: Arc<dyn Signer>,
    opts: impl IntoIterator<Item = TransportOption>,
) -> Result<InstallationToken, AuthError> {
    let transport = Transport::new(app_id, signer, opts).await?;
    transport.installation_token().await
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;

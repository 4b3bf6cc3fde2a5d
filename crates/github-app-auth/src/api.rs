//! Wire types and constants for the platform REST API.
//!
//! Types cover just the app endpoints this crate calls and should be
//! considered incomplete. Use a full API client on top of
//! [`Transport`](crate::transport::Transport) for everything else.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Default REST API endpoint.
pub(crate) const DEFAULT_ENDPOINT: &str = "https://api.github.com/";

/// Default User-Agent for bootstrap and token renewal requests.
pub(crate) const USER_AGENT_VALUE: &str = "github-app-auth/0.1";

pub(crate) const ACCEPT_VALUE: &str = "application/vnd.github.v3+json";
pub(crate) const API_VERSION_HEADER: &str = "x-github-api-version";
pub(crate) const API_VERSION_VALUE: &str = "2022-11-28";
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";

// Webhook headers in canonical form.
pub(crate) const EVENT_HEADER: &str = "X-GitHub-Event";
pub(crate) const HOOK_ID_HEADER: &str = "X-GitHub-Hook-ID";
pub(crate) const DELIVERY_HEADER: &str = "X-GitHub-Delivery";
pub(crate) const TARGET_ID_HEADER: &str = "X-GitHub-Hook-Installation-Target-ID";
pub(crate) const TARGET_TYPE_HEADER: &str = "X-GitHub-Hook-Installation-Target-Type";
pub(crate) const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// App metadata from `GET /app`. The record carries much more; only the
/// slug is consumed here.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct App {
    pub slug: Option<String>,
}

/// User record, as embedded in installation and bot user responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct User {
    pub login: Option<String>,
    pub id: Option<i64>,
}

/// Repository record, as embedded in token exchange responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Repository {
    pub name: Option<String>,
}

/// Installation record from `GET /app/installations/{id}` or
/// `GET /users/{login}/installation`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Installation {
    pub id: Option<i64>,
    pub account: Option<User>,
    pub permissions: Option<BTreeMap<String, String>>,
    pub suspended_at: Option<DateTime<Utc>>,
}

/// Body for `POST /app/installations/{id}/access_tokens`. Empty collections
/// are omitted, which requests the installation defaults.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstallationTokenRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub permissions: BTreeMap<String, String>,
}

/// Body of a successful token exchange response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InstallationTokenResponse {
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Option<BTreeMap<String, String>>,
    pub repositories: Option<Vec<Repository>>,
}

/// Error body shape used across the platform API. Fields are inconsistent
/// between endpoints, so everything is optional.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub message: Option<String>,
}

/// Fold a non-success response body into an error string, keeping the
/// platform's own message when the body parses as [`ErrorResponse`]. The
/// status is always included so callers can match on it.
pub(crate) fn error_text(status: StatusCode, body: &[u8]) -> String {
    if let Ok(err) = serde_json::from_slice::<ErrorResponse>(body) {
        if let Some(message) = err.message {
            if !message.is_empty() {
                return format!("{message}({status})");
            }
        }
    }
    status.to_string()
}

/// Access level of a permission scope, ordered `read < write < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PermissionLevel {
    Read,
    Write,
    Admin,
}

impl FromStr for PermissionLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;

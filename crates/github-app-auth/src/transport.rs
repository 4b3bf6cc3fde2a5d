//! Authenticating HTTP transport.
//!
//! [`Transport`] wraps an inner [`RoundTripper`] and injects the right
//! bearer into every outgoing platform API request: the app JWT for
//! app-level calls and token renewals, an installation access token for
//! everything else. Both bearers are cached and refreshed as they approach
//! expiry, so the transport can be shared across concurrent request
//! handlers for the lifetime of the process.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::api;
use crate::api::PermissionLevel;
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::jwt::{Jwt, Rs256Minter};
use crate::options::{TransportBuilder, TransportOption};
use crate::signer::Signer;
use crate::token::InstallationToken;

/// An HTTP transport for buffered requests.
///
/// This is the seam between the authentication middleware and the actual
/// HTTP client. [`Transport`] implements it by decorating a request and
/// delegating to the inner implementation, normally a
/// [`ReqwestRoundTripper`].
#[async_trait]
pub trait RoundTripper: Send + Sync {
    /// Execute a single request and return the buffered response.
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, AuthError>;
}

/// [`RoundTripper`] over a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestRoundTripper {
    client: reqwest::Client,
}

impl ReqwestRoundTripper {
    /// Wrap an existing client, keeping its pool, proxy and TLS settings.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoundTripper for ReqwestRoundTripper {
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, AuthError> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut out = http::Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

/// Request extension marking internal token renewal calls.
///
/// Renewals must authenticate with the app JWT even when an installation is
/// configured; the marker breaks what would otherwise be infinite
/// recursion through the token exchange. Never exposed to callers.
#[derive(Debug, Clone, Copy)]
struct JwtMarker;

/// Append path segments to a base URL, keeping any base path prefix.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, AuthError> {
    let mut url = base.clone();
    {
        let mut parts = url.path_segments_mut().map_err(|_| AuthError::Options {
            message: format!("endpoint URL cannot be a base: {base}"),
        })?;
        parts.pop_if_empty();
        for segment in segments {
            parts.push(segment);
        }
    }
    Ok(url)
}

pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue, AuthError> {
    let mut value =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| AuthError::ApiEndpoint {
            message: "token contains invalid header characters".to_string(),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

fn request_build_error(e: http::Error) -> AuthError {
    AuthError::ApiEndpoint {
        message: format!("failed to build request: {e}"),
    }
}

/// Check that every requested scope is covered by the installation grant.
///
/// An empty request passes, the installation defaults apply. For each
/// requested `scope:level` the grant must contain the scope at the same or
/// a higher level under the order `read < write < admin`. Missing and
/// under-levelled scopes are collected and reported together; a level
/// outside the known set on either side is its own error.
pub(crate) fn reconcile_scopes(
    requested: &BTreeMap<String, String>,
    granted: Option<&BTreeMap<String, String>>,
) -> Result<(), AuthError> {
    if requested.is_empty() {
        return Ok(());
    }
    let empty = BTreeMap::new();
    let granted = granted.unwrap_or(&empty);

    let mut missing = Vec::new();
    for (scope, level) in requested {
        let requested_level: PermissionLevel =
            level.parse().map_err(|()| AuthError::ScopedPermissions {
                message: format!("unknown {scope} level - {level}"),
            })?;
        match granted.get(scope) {
            None => missing.push(scope.clone()),
            Some(granted_level) => {
                let granted_level: PermissionLevel =
                    granted_level
                        .parse()
                        .map_err(|()| AuthError::ScopedPermissions {
                            message: format!("unknown {scope} level - {granted_level}"),
                        })?;
                if granted_level < requested_level {
                    missing.push(format!("{scope}:{level}"));
                }
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::ScopedPermissions {
            message: format!("missing requested permissions: {missing:?}"),
        })
    }
}

/// Authenticating transport for a single app, optionally bound to one
/// installation.
///
/// Construction verifies the credentials end to end: it probes the app
/// record, resolves and checks the installation when one is configured,
/// validates requested scopes against the grant, mints a first installation
/// token and fetches the bot user identity. After construction the value is
/// immutable apart from its two internal token caches and can be shared
/// freely behind an [`Arc`].
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use github_app_auth::{with_owner, with_permissions, LocalRsaSigner, Transport};
/// # async fn example(signer: Arc<LocalRsaSigner>) -> Result<(), github_app_auth::AuthError> {
/// let transport = Transport::new(
///     1234,
///     signer,
///     [with_owner("octocat"), with_permissions(["contents:read"])],
/// )
/// .await?;
/// let token = transport.installation_token().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transport {
    app_id: u64,
    app_slug: String,
    install_id: Option<u64>,
    owner: Option<String>,
    repos: Vec<String>,
    scopes: BTreeMap<String, String>,
    user_agent: String,
    base_url: Url,
    token_url: Option<Url>,
    next: Arc<dyn RoundTripper>,
    minter: Rs256Minter,
    clock: Arc<dyn Clock>,
    bot_username: String,
    bot_email: String,
    jwt_cache: RwLock<Option<Jwt>>,
    token_cache: RwLock<Option<InstallationToken>>,
}

impl Transport {
    /// Build and verify a transport for `app_id` signing with `signer`.
    ///
    /// With no installation options the transport authenticates every call
    /// with the app JWT, which only reaches app-level endpoints. Use
    /// [`with_installation_id`](crate::options::with_installation_id),
    /// [`with_owner`](crate::options::with_owner) or
    /// [`with_repositories`](crate::options::with_repositories) to bind an
    /// installation, and
    /// [`with_permissions`](crate::options::with_permissions) to narrow the
    /// tokens it mints.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Options`] for invalid or conflicting configuration,
    ///   including unsupported signing keys.
    /// - [`AuthError::AppCredentials`] when the platform rejects the app id
    ///   or key.
    /// - [`AuthError::AppInstallation`] when the installation is missing,
    ///   suspended or inconsistent with the configuration.
    /// - [`AuthError::ScopedPermissions`] when requested scopes exceed the
    ///   installation grant.
    #[instrument(skip_all, fields(app_id = app_id))]
    pub async fn new(
        app_id: u64,
        signer: Arc<dyn Signer>,
        opts: impl IntoIterator<Item = TransportOption>,
    ) -> Result<Self, AuthError> {
        if app_id == 0 {
            return Err(AuthError::Options {
                message: "app id cannot be zero".to_string(),
            });
        }

        let mut builder = TransportBuilder::default();
        let mut errors = Vec::new();
        for opt in opts {
            if let Err(e) = opt.apply(&mut builder) {
                errors.push(e);
            }
        }
        // Repositories without an owner leave the installation unresolvable.
        if builder.owner.is_none() && !builder.repos.is_empty() {
            errors.push("owner not specified".to_string());
        }
        if !errors.is_empty() {
            return Err(AuthError::Options {
                message: errors.join("; "),
            });
        }

        let next: Arc<dyn RoundTripper> = match builder.round_tripper {
            Some(rt) => rt,
            None => Arc::new(ReqwestRoundTripper::new(reqwest::Client::builder().build()?)),
        };
        let base_url = match builder.endpoint {
            Some(url) => url,
            None => Url::parse(api::DEFAULT_ENDPOINT).map_err(|e| AuthError::Options {
                message: format!("invalid default endpoint: {e}"),
            })?,
        };
        let minter = Rs256Minter::for_signer(signer)?;

        let mut transport = Self {
            app_id,
            app_slug: String::new(),
            install_id: builder.installation_id,
            owner: builder.owner,
            repos: builder.repos,
            scopes: builder.scopes.unwrap_or_default(),
            user_agent: builder
                .user_agent
                .unwrap_or_else(|| api::USER_AGENT_VALUE.to_string()),
            base_url,
            token_url: None,
            next,
            minter,
            clock: builder.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            bot_username: String::new(),
            bot_email: String::new(),
            jwt_cache: RwLock::new(None),
            token_cache: RwLock::new(None),
        };

        // Verify the app id and key by fetching the app record through the
        // transport itself; this also learns the app slug.
        transport.app_slug = transport.check_app().await?;
        debug!(app_slug = %transport.app_slug, "verified app credentials");

        // Owner is set when repositories or an owner were configured;
        // install id when one was given directly. Either binds an
        // installation, which must be resolved and proven usable.
        if transport.owner.is_some() || transport.install_id.is_some() {
            transport.check_installation().await?;
            transport.fetch_bot_user().await?;
        }

        Ok(transport)
    }

    /// App id the transport authenticates as.
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// App slug learned from the app record during construction.
    pub fn app_name(&self) -> &str {
        &self.app_slug
    }

    /// Resolved installation id, if an installation is configured.
    pub fn installation_id(&self) -> Option<u64> {
        self.install_id
    }

    /// Installation owner login, if an installation is configured.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Username of the app's bot user, for example `my-app[bot]`. Empty
    /// when no installation is configured.
    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    /// No-reply committer email attributing commits to the bot user. Empty
    /// when no installation is configured.
    pub fn bot_committer_email(&self) -> &str {
        &self.bot_email
    }

    /// Permission scopes requested for minted tokens. Empty means the
    /// installation defaults apply.
    pub fn scoped_permissions(&self) -> BTreeMap<String, String> {
        self.scopes.clone()
    }

    /// Return the cached app JWT, minting a replacement when the cached one
    /// is missing or within a minute of expiry.
    pub async fn jwt(&self) -> Result<Jwt, AuthError> {
        let now = self.clock.now();
        let cached = self
            .jwt_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(jwt) = cached {
            if jwt.is_valid_at(now) {
                return Ok(jwt);
            }
        }

        let mut jwt = self.minter.mint(self.app_id, "", now).await?;
        jwt.set_app_name(&self.app_slug);
        *self
            .jwt_cache
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(jwt.clone());
        Ok(jwt)
    }

    /// Mint a fresh installation access token.
    ///
    /// Every call produces a new token scoped to the configured
    /// repositories and permissions, so callers may revoke what they
    /// receive without affecting the transport.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InstallationToken`] when no installation is
    ///   configured or the exchange cannot be encoded.
    /// - [`AuthError::AppCredentials`] on 403, [`AuthError::AppInstallation`]
    ///   on 404 and [`AuthError::ScopedPermissions`] on 422 responses.
    /// - [`AuthError::ApiEndpoint`] for any other failure or a malformed
    ///   response body.
    #[instrument(skip(self), fields(installation_id = ?self.install_id))]
    pub async fn installation_token(&self) -> Result<InstallationToken, AuthError> {
        let (Some(install_id), Some(token_url)) = (self.install_id, self.token_url.as_ref())
        else {
            return Err(AuthError::InstallationToken {
                message: "installation id is not configured".to_string(),
            });
        };

        let body = serde_json::to_vec(&api::InstallationTokenRequest {
            repositories: self.repos.clone(),
            permissions: self.scopes.clone(),
        })
        .map_err(|e| AuthError::InstallationToken {
            message: format!("failed to encode token request: {e}"),
        })?;

        let mut request = http::Request::builder()
            .method(Method::POST)
            .uri(token_url.as_str())
            .header(CONTENT_TYPE, api::CONTENT_TYPE_JSON)
            .body(Bytes::from(body))
            .map_err(request_build_error)?;
        // The exchange itself must authenticate with the app JWT.
        request.extensions_mut().insert(JwtMarker);

        let response = self.round_trip(request).await?;
        let status = response.status();
        let data = response.into_body();

        if status != StatusCode::CREATED {
            let message = format!(
                "failed to mint installation token: {}",
                api::error_text(status, &data)
            );
            return Err(match status {
                StatusCode::FORBIDDEN => AuthError::AppCredentials { message },
                StatusCode::NOT_FOUND => AuthError::AppInstallation { message },
                StatusCode::UNPROCESSABLE_ENTITY => AuthError::ScopedPermissions { message },
                _ => AuthError::ApiEndpoint { message },
            });
        }

        let token_response: api::InstallationTokenResponse = serde_json::from_slice(&data)
            .map_err(|e| AuthError::ApiEndpoint {
                message: format!("failed to decode token response: {e}"),
            })?;
        let token = match token_response.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(AuthError::ApiEndpoint {
                    message: "token response is missing the token".to_string(),
                })
            }
        };

        let repositories = token_response
            .repositories
            .unwrap_or_default()
            .into_iter()
            .filter_map(|repo| repo.name)
            .collect();

        Ok(InstallationToken {
            token,
            app_id: self.app_id,
            app_name: self.app_slug.clone(),
            installation_id: install_id,
            server: self.base_url.to_string(),
            user_agent: self.user_agent.clone(),
            expires_at: token_response.expires_at,
            owner: self.owner.clone().unwrap_or_default(),
            repositories,
            permissions: token_response.permissions.unwrap_or_default(),
            bot_username: self.bot_username.clone(),
            bot_committer_email: self.bot_email.clone(),
        })
    }

    /// Authorization header value for installation-level calls, reusing the
    /// cached token while it stays valid.
    pub(crate) async fn installation_authz_header(&self) -> Result<String, AuthError> {
        let now = self.clock.now();
        let cached = self
            .token_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(token) = cached {
            if token.is_valid_at(now) {
                return Ok(format!("Bearer {}", token.token));
            }
        }

        let token = self.installation_token().await?;
        let header = format!("Bearer {}", token.token);
        *self
            .token_cache
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(token);
        Ok(header)
    }

    /// Verify the app id and signing key against the app record and return
    /// the app slug.
    async fn check_app(&self) -> Result<String, AuthError> {
        let url = join_segments(&self.base_url, &["app"])?;
        let mut request = http::Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Bytes::new())
            .map_err(request_build_error)?;
        request.extensions_mut().insert(JwtMarker);

        let response = self.round_trip(request).await?;
        let status = response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::AppCredentials {
                    message: format!("invalid app id or credentials: {status}"),
                });
            }
            _ => {
                return Err(AuthError::AppInstallation {
                    message: format!(
                        "failed to verify key for app id {}: {}",
                        self.app_id,
                        api::error_text(status, response.body())
                    ),
                });
            }
        }

        let app: api::App =
            serde_json::from_slice(response.body()).map_err(|e| AuthError::ApiEndpoint {
                message: format!("failed to decode app response: {e}"),
            })?;
        app.slug.ok_or_else(|| AuthError::ApiEndpoint {
            message: "app response is missing the slug".to_string(),
        })
    }

    /// Resolve the installation, prove it usable and prime the token cache.
    ///
    /// Resolution is by id when one is configured, by owner otherwise. The
    /// record must not be suspended, the grant must cover every requested
    /// scope, and a configured id must match the resolved one.
    async fn check_installation(&mut self) -> Result<(), AuthError> {
        let url = match self.install_id {
            Some(id) => {
                join_segments(&self.base_url, &["app", "installations", &id.to_string()])?
            }
            None => {
                let owner = self.owner.as_deref().unwrap_or_default();
                join_segments(&self.base_url, &["users", owner, "installation"])?
            }
        };
        let mut request = http::Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Bytes::new())
            .map_err(request_build_error)?;
        request.extensions_mut().insert(JwtMarker);

        let response = self.round_trip(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::AppInstallation {
                message: api::error_text(status, response.body()),
            });
        }

        let installation: api::Installation =
            serde_json::from_slice(response.body()).map_err(|e| AuthError::ApiEndpoint {
                message: format!("failed to decode installation response: {e}"),
            })?;

        if let Some(suspended_at) = installation.suspended_at {
            if suspended_at < self.clock.now() {
                return Err(AuthError::AppInstallation {
                    message: format!(
                        "installation id {} is not active",
                        installation.id.unwrap_or_default()
                    ),
                });
            }
        }

        // Effective permissions are what the installation grants, not what
        // the app declares; scopes are validated against the grant.
        reconcile_scopes(&self.scopes, installation.permissions.as_ref())?;

        let actual_id = installation
            .id
            .and_then(|id| u64::try_from(id).ok())
            .ok_or_else(|| AuthError::ApiEndpoint {
                message: "installation response is missing the id".to_string(),
            })?;
        match self.install_id {
            None => self.install_id = Some(actual_id),
            Some(configured) if configured != actual_id => {
                return Err(AuthError::AppInstallation {
                    message: format!(
                        "configured installation id {configured} does not match actual value {actual_id}"
                    ),
                });
            }
            _ => {}
        }

        // Owner is absent when only an installation id was given.
        if self.owner.is_none() {
            let login = installation
                .account
                .and_then(|account| account.login)
                .ok_or_else(|| AuthError::ApiEndpoint {
                    message: "installation response is missing the account login".to_string(),
                })?;
            self.owner = Some(login);
        }

        self.token_url = Some(join_segments(
            &self.base_url,
            &[
                "app",
                "installations",
                &actual_id.to_string(),
                "access_tokens",
            ],
        )?);

        // Mint a first token for the configured scopes and repositories.
        // This proves the grant end to end and primes the cache for the
        // bot user fetch that follows.
        self.installation_authz_header().await?;

        debug!(installation_id = actual_id, "verified installation");
        Ok(())
    }

    /// Fetch the bot user record and derive the committer identity.
    async fn fetch_bot_user(&mut self) -> Result<(), AuthError> {
        let url = join_segments(&self.base_url, &["users", &format!("{}[bot]", self.app_slug)])?;
        let request = http::Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Bytes::new())
            .map_err(request_build_error)?;

        let response = self.round_trip(request).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::ApiEndpoint {
                message: format!(
                    "failed to fetch bot user metadata: {}",
                    api::error_text(status, response.body())
                ),
            });
        }

        let user: api::User =
            serde_json::from_slice(response.body()).map_err(|e| AuthError::ApiEndpoint {
                message: format!("failed to decode bot user response: {e}"),
            })?;
        let (Some(id), Some(login)) = (user.id, user.login) else {
            return Err(AuthError::ApiEndpoint {
                message: "missing user id or login in bot user response".to_string(),
            });
        };

        self.bot_email = format!("{id}+{login}@users.noreply.github.com");
        self.bot_username = login;
        Ok(())
    }

    /// Reject requests whose host differs from the configured endpoint, so
    /// a transport reused for the wrong client never leaks a bearer.
    fn check_host(&self, uri: &http::Uri) -> Result<(), AuthError> {
        fn default_port(scheme: Option<&str>) -> Option<u16> {
            match scheme {
                Some("http") => Some(80),
                Some("https") => Some(443),
                _ => None,
            }
        }

        let request_host = uri.host().unwrap_or_default();
        let base_host = self.base_url.host_str().unwrap_or_default();
        let request_port = uri.port_u16().or_else(|| default_port(uri.scheme_str()));
        let base_port = self.base_url.port_or_known_default();

        if !request_host.eq_ignore_ascii_case(base_host) || request_port != base_port {
            return Err(AuthError::Options {
                message: format!(
                    "transport host({base_host}) does not match request host({request_host})"
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoundTripper for Transport {
    /// Attach the appropriate bearer and forward to the inner transport.
    ///
    /// Renewal calls always present the app JWT and get the library's
    /// Accept and api-version headers unconditionally, with the configured
    /// User-Agent as a fallback. Other calls present the installation token
    /// when an installation is configured and only have Accept and
    /// api-version filled in when absent. The Authorization header is
    /// always overwritten.
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, AuthError> {
        self.check_host(request.uri())?;

        let mut request = request;
        let is_renewal = request.extensions().get::<JwtMarker>().is_some();
        let api_version = HeaderName::from_static(api::API_VERSION_HEADER);

        let headers = request.headers_mut();
        if is_renewal {
            headers.insert(ACCEPT, HeaderValue::from_static(api::ACCEPT_VALUE));
            headers.insert(api_version, HeaderValue::from_static(api::API_VERSION_VALUE));
            if !headers.contains_key(USER_AGENT) {
                let user_agent = HeaderValue::from_str(&self.user_agent).map_err(|_| {
                    AuthError::Options {
                        message: "user agent contains invalid header characters".to_string(),
                    }
                })?;
                headers.insert(USER_AGENT, user_agent);
            }
        } else {
            if !headers.contains_key(ACCEPT) {
                headers.insert(ACCEPT, HeaderValue::from_static(api::ACCEPT_VALUE));
            }
            if !headers.contains_key(&api_version) {
                headers.insert(api_version, HeaderValue::from_static(api::API_VERSION_VALUE));
            }
        }

        let authorization = if self.install_id.is_none() || is_renewal {
            let jwt = self.jwt().await?;
            bearer_header(jwt.token())?
        } else {
            let value = self.installation_authz_header().await?;
            let mut value = HeaderValue::from_str(&value).map_err(|_| AuthError::ApiEndpoint {
                message: "token contains invalid header characters".to_string(),
            })?;
            value.set_sensitive(true);
            value
        };
        request.headers_mut().insert(AUTHORIZATION, authorization);

        self.next.round_trip(request).await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("app_id", &self.app_id)
            .field("app_slug", &self.app_slug)
            .field("installation_id", &self.install_id)
            .field("owner", &self.owner)
            .field("repos", &self.repos)
            .field("scopes", &self.scopes)
            .field("base_url", &self.base_url.as_str())
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

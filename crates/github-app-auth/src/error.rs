//! Error types for GitHub App authentication operations.
//!
//! Callers should match on error variants rather than message contents;
//! messages are for humans and are not part of the stable contract.

use thiserror::Error;

/// Errors produced while configuring a transport, authenticating as an app,
/// or exchanging and revoking installation tokens.
///
/// Nothing in this crate retries; transient transport failures surface to
/// the caller as [`AuthError::Http`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// Caller-supplied configuration is invalid or inconsistent.
    #[error("invalid options: {message}")]
    Options { message: String },

    /// The app id and signing key were rejected by the platform.
    #[error("invalid app credentials: {message}")]
    AppCredentials { message: String },

    /// The installation is missing, suspended, or does not match the
    /// configured owner or installation id.
    #[error("installation error: {message}")]
    AppInstallation { message: String },

    /// A requested permission scope is not granted to the installation,
    /// is granted at a lower level, or uses an unknown level.
    #[error("scoped permissions error: {message}")]
    ScopedPermissions { message: String },

    /// Installation token exchange or revocation failed.
    #[error("installation token error: {message}")]
    InstallationToken { message: String },

    /// The platform returned a malformed or unexpected response.
    #[error("unexpected API response: {message}")]
    ApiEndpoint { message: String },

    /// The signer failed or was cancelled while signing the JWT.
    #[error("failed to sign JWT: {0}")]
    JwtSign(#[from] SignerError),

    /// HTTP transport failure (connection, TLS, request build).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    /// Check if this error represents a transient condition that may succeed
    /// if the operation is repeated.
    ///
    /// Only transport-level failures are transient; credential, installation
    /// and configuration errors are permanent until the inputs change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Errors produced by a [`Signer`](crate::signer::Signer) implementation.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The signing operation itself failed.
    #[error("signing operation failed: {message}")]
    Failed { message: String },

    /// The signing operation was cancelled before completion, for example
    /// because a remote key service deadline elapsed.
    #[error("signing operation was cancelled")]
    Cancelled,
}

/// Errors returned by [`verify_webhook`](crate::webhook::verify_webhook).
///
/// Each variant maps naturally to an HTTP status when translating for the
/// sender: `Request` to 400, `Method` to 405, `ContentType` to 415 and
/// `Signature` to 401.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The request is malformed or missing required webhook headers.
    #[error("invalid webhook request: {message}")]
    Request { message: String },

    /// The request method is not POST.
    #[error("webhook method not supported: {method}")]
    Method { method: String },

    /// The request content type is not `application/json`.
    #[error("unsupported webhook content type: {content_type}")]
    ContentType { content_type: String },

    /// The HMAC-SHA256 signature does not match the request body.
    #[error("webhook HMAC-SHA256 signature is invalid")]
    Signature,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

//! # github-app-auth
//!
//! Authenticate as a GitHub App from Rust: mint RS256 app JWTs with an
//! injected signing key, exchange them for scoped installation access
//! tokens, attach the right bearer to outgoing REST API requests, and
//! verify inbound webhook deliveries.
//!
//! The core type is [`Transport`], a [`RoundTripper`] middleware that wraps
//! an inner HTTP transport. Construction validates the app credentials and
//! the configured installation end to end; afterwards every request routed
//! through it carries a fresh bearer, with the JWT and installation token
//! refreshed as they approach expiry.
//!
//! ```no_run
//! use std::sync::Arc;
//! use github_app_auth::{with_permissions, with_repositories, LocalRsaSigner, Transport};
//!
//! # async fn example(private_key_pem: &str) -> Result<(), github_app_auth::AuthError> {
//! let signer = Arc::new(LocalRsaSigner::from_pkcs1_pem(private_key_pem)?);
//! let transport = Transport::new(
//!     1234,
//!     signer,
//!     [
//!         with_repositories(["octocat/hello-world"]),
//!         with_permissions(["contents:read", "issues:write"]),
//!     ],
//! )
//! .await?;
//!
//! let token = transport.installation_token().await?;
//! println!("token for {} expires at {:?}", token.owner, token.expires_at);
//! # Ok(())
//! # }
//! ```
//!
//! Inbound deliveries are verified separately with [`verify_webhook`],
//! which checks the delivery headers and the HMAC-SHA256 signature in
//! constant time.
//!
//! Keys held in hardware or a cloud key service plug in through the
//! [`Signer`] trait; [`LocalRsaSigner`] covers the common case of a PEM
//! key on disk. Only RSA keys of at least 2048 bits are accepted.

mod api;
pub mod clock;
pub mod error;
pub mod jwt;
pub mod options;
pub mod signer;
pub mod token;
pub mod transport;
pub mod webhook;

pub use clock::{Clock, SystemClock};
pub use error::{AuthError, SignerError, WebhookError};
pub use jwt::{new_jwt, Jwt};
pub use options::{
    options, with_endpoint, with_installation_id, with_owner, with_permissions,
    with_repositories, with_round_tripper, with_user_agent, TransportOption,
};
pub use signer::{DigestAlgorithm, LocalRsaSigner, PublicKey, Signer};
pub use token::{new_installation_token, InstallationToken};
pub use transport::{ReqwestRoundTripper, RoundTripper, Transport};
pub use webhook::{verify_webhook, WebHook};

#[cfg(test)]
pub(crate) mod testutil;

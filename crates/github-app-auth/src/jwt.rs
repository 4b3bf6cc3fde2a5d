//! App JWT minting.
//!
//! An app authenticates to the platform by presenting a short-lived
//! self-signed JWT. The platform mandates RS256, integer timestamps and a
//! lifetime of at most ten minutes; this crate signs a two minute window
//! with thirty seconds of backdating to absorb clock skew.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::signer::{DigestAlgorithm, PublicKey, Signer};

/// JWT bearer token used to authenticate as an app.
///
/// The token string never appears in debug output.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use github_app_auth::Jwt;
///
/// let now = Utc::now();
/// let jwt = Jwt::new("token".to_string(), 99, now - Duration::seconds(30), now + Duration::minutes(2));
/// assert!(jwt.is_valid());
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Jwt {
    token: String,
    #[serde(default)]
    app_id: u64,
    #[serde(default)]
    app_name: String,
    #[serde(rename = "iat")]
    issued_at: DateTime<Utc>,
    #[serde(rename = "exp")]
    expires_at: DateTime<Utc>,
}

impl Jwt {
    /// Create a JWT value from its parts.
    pub fn new(
        token: String,
        app_id: u64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            app_id,
            app_name: String::new(),
            issued_at,
            expires_at,
        }
    }

    /// Compact-serialized token, for use as `Authorization: Bearer <token>`.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// App id the token was minted for.
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// App slug, if known. Tokens minted through a transport carry the slug
    /// learned during bootstrap; standalone tokens do not.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Instant the token was issued (backdated thirty seconds at mint).
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Instant the token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check that the token is usable now and for at least another minute.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// [`is_valid`](Self::is_valid) against an explicit instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty()
            && self.issued_at <= now
            && self.expires_at > now + Duration::seconds(60)
    }

    pub(crate) fn set_app_name(&mut self, app_name: &str) {
        self.app_name = app_name.to_string();
    }
}

impl std::fmt::Debug for Jwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwt")
            .field("app_id", &self.app_id)
            .field("app_name", &self.app_name)
            .field("iat", &self.issued_at)
            .field("exp", &self.expires_at)
            .field("token", &"REDACTED")
            .finish()
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Serialize)]
struct JwtPayload {
    iss: String,
    iat: i64,
    exp: i64,
}

/// Mints RS256 app JWTs through a [`Signer`].
pub(crate) struct Rs256Minter {
    signer: Arc<dyn Signer>,
}

impl Rs256Minter {
    /// Gate the signer's key and build a minter.
    ///
    /// Only RSA keys with a modulus of at least 2048 bits are accepted;
    /// everything else is a configuration error.
    pub(crate) fn for_signer(signer: Arc<dyn Signer>) -> Result<Self, AuthError> {
        match signer.public_key() {
            PublicKey::Rsa(key) => {
                use rsa::traits::PublicKeyParts;
                let bits = key.n().bits();
                if bits < 2048 {
                    return Err(AuthError::Options {
                        message: format!("rsa key size({bits}) < 2048 bits"),
                    });
                }
                Ok(Self { signer })
            }
            PublicKey::Other(algorithm) => Err(AuthError::Options {
                message: format!("unsupported key type: {algorithm}"),
            }),
        }
    }

    /// Mint a token for `app_id` at instant `now`.
    ///
    /// The platform rejects fractional timestamps, so `now` is truncated to
    /// whole seconds before the window is computed.
    pub(crate) async fn mint(
        &self,
        app_id: u64,
        app_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Jwt, AuthError> {
        let now = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let iat = now - Duration::seconds(30);
        let exp = now + Duration::minutes(2);

        let header = serde_json::to_vec(&JwtHeader {
            alg: "RS256",
            typ: "JWT",
        })
        .map_err(|e| AuthError::ApiEndpoint {
            message: format!("failed to encode JWT header: {e}"),
        })?;
        let payload = serde_json::to_vec(&JwtPayload {
            iss: app_id.to_string(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
        })
        .map_err(|e| AuthError::ApiEndpoint {
            message: format!("failed to encode JWT payload: {e}"),
        })?;

        // Signing string: base64url(header) "." base64url(payload), no padding.
        let mut token = String::with_capacity(1024);
        token.push_str(&URL_SAFE_NO_PAD.encode(&header));
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(&payload));

        let digest = Sha256::digest(token.as_bytes());
        let signature = self.signer.sign(&digest, DigestAlgorithm::Sha256).await?;

        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(&signature));

        Ok(Jwt {
            token,
            app_id,
            app_name: app_name.to_string(),
            issued_at: iat,
            expires_at: exp,
        })
    }
}

/// Mint a standalone app JWT without constructing a transport.
///
/// Unlike [`Transport::new`](crate::transport::Transport::new) this does not
/// verify the credentials against the platform; it only gates the key and
/// signs. The returned token is valid for at least five minutes of platform
/// headroom provided the local clock is accurate.
///
/// # Errors
///
/// Returns [`AuthError::Options`] for a zero app id or an unsupported key,
/// and [`AuthError::JwtSign`] when the signer fails.
pub async fn new_jwt(app_id: u64, signer: Arc<dyn Signer>) -> Result<Jwt, AuthError> {
    if app_id == 0 {
        return Err(AuthError::Options {
            message: "app id cannot be zero".to_string(),
        });
    }
    let minter = Rs256Minter::for_signer(signer)?;
    minter.mint(app_id, "", Utc::now()).await
}

#[cfg(test)]
#[path = "jwt_tests.rs"]
mod tests;

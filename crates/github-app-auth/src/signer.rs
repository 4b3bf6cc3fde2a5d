//! Signing key abstraction for app JWTs.
//!
//! The crate never holds private key material itself. It hands a SHA-256
//! digest to a [`Signer`] and receives back a raw RSASSA-PKCS1-v1_5
//! signature. [`LocalRsaSigner`] is the in-process implementation; keys held
//! in hardware or a cloud key service implement the same trait.

use async_trait::async_trait;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::SignerError;

/// Public half of an app signing key.
///
/// The platform only accepts RSA keys for app JWTs. Non-RSA keys are
/// reported by algorithm name so that configuration errors name the
/// offending key type.
#[derive(Debug, Clone)]
pub enum PublicKey {
    /// An RSA public key.
    Rsa(RsaPublicKey),
    /// Any other key algorithm, identified by name (for example
    /// "ecdsa-p256" or "ed25519").
    Other(String),
}

/// Digest algorithm for a signing request.
///
/// The platform mandates RS256, so SHA-256 is the only accepted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

/// Produces RSASSA-PKCS1-v1_5 signatures over externally computed digests.
///
/// Implementations must be safe to call from concurrent tasks. Cancellation
/// propagates by dropping the returned future; implementations backed by a
/// remote key service should surface their own deadline failures as
/// [`SignerError::Cancelled`].
///
/// # Examples
///
/// ```no_run
/// # use github_app_auth::{LocalRsaSigner, Signer};
/// # fn example(pem: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let signer = LocalRsaSigner::from_pkcs1_pem(pem)?;
/// let _key = signer.public_key();
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key corresponding to the signing key.
    fn public_key(&self) -> PublicKey;

    /// Sign a precomputed digest.
    ///
    /// `digest` is the raw hash output (32 bytes for SHA-256), not the
    /// message. The returned bytes are the PKCS#1 v1.5 signature.
    async fn sign(&self, digest: &[u8], algorithm: DigestAlgorithm) -> Result<Vec<u8>, SignerError>;
}

/// In-process signer over an RSA private key.
pub struct LocalRsaSigner {
    key: RsaPrivateKey,
}

impl LocalRsaSigner {
    /// Create a signer from an already parsed private key.
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Parse a PKCS#1 PEM private key (`BEGIN RSA PRIVATE KEY`), the format
    /// the platform hands out when generating an app key.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self, SignerError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem.trim()).map_err(|e| SignerError::Failed {
            message: format!("failed to parse PKCS#1 private key: {e}"),
        })?;
        Ok(Self { key })
    }

    /// Parse a PKCS#8 PEM private key (`BEGIN PRIVATE KEY`).
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SignerError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem.trim()).map_err(|e| SignerError::Failed {
            message: format!("failed to parse PKCS#8 private key: {e}"),
        })?;
        Ok(Self { key })
    }
}

// The private key never appears in debug output.
impl std::fmt::Debug for LocalRsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRsaSigner")
            .field("key", &"REDACTED")
            .finish()
    }
}

#[async_trait]
impl Signer for LocalRsaSigner {
    fn public_key(&self) -> PublicKey {
        PublicKey::Rsa(self.key.to_public_key())
    }

    async fn sign(&self, digest: &[u8], algorithm: DigestAlgorithm) -> Result<Vec<u8>, SignerError> {
        let padding = match algorithm {
            DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        };
        self.key
            .sign(padding, digest)
            .map_err(|e| SignerError::Failed {
                message: format!("rsa signing failed: {e}"),
            })
    }
}

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;

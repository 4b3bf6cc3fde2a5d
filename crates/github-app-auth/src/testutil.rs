//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;

use crate::clock::Clock;
use crate::error::{AuthError, SignerError};
use crate::signer::{DigestAlgorithm, LocalRsaSigner, PublicKey, Signer};
use crate::transport::RoundTripper;

/// Test RSA key at the minimum accepted size. Generated once per test
/// binary; key generation is by far the slowest part of the suite.
pub(crate) fn rsa_2048() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate 2048-bit RSA key")
    })
}

/// Undersized RSA key for rejection tests.
pub(crate) fn rsa_1024() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate 1024-bit RSA key")
    })
}

pub(crate) fn test_signer() -> Arc<LocalRsaSigner> {
    Arc::new(LocalRsaSigner::new(rsa_2048().clone()))
}

/// Signer reporting a non-RSA key, as a KMS-backed implementation would for
/// an Ed25519 key.
pub(crate) struct UnsupportedKeySigner;

#[async_trait]
impl Signer for UnsupportedKeySigner {
    fn public_key(&self) -> PublicKey {
        PublicKey::Other("ed25519".to_string())
    }

    async fn sign(
        &self,
        _digest: &[u8],
        _algorithm: DigestAlgorithm,
    ) -> Result<Vec<u8>, SignerError> {
        Err(SignerError::Failed {
            message: "unsupported key".to_string(),
        })
    }
}

/// Signer that always fails, for exercising the JwtSign error path.
pub(crate) struct FailingSigner;

#[async_trait]
impl Signer for FailingSigner {
    fn public_key(&self) -> PublicKey {
        PublicKey::Rsa(rsa_2048().to_public_key())
    }

    async fn sign(
        &self,
        _digest: &[u8],
        _algorithm: DigestAlgorithm,
    ) -> Result<Vec<u8>, SignerError> {
        Err(SignerError::Failed {
            message: "key service unavailable".to_string(),
        })
    }
}

/// Decorator counting signing operations, for cache behavior assertions.
pub(crate) struct CountingSigner {
    inner: Arc<dyn Signer>,
    count: AtomicUsize,
}

impl CountingSigner {
    pub(crate) fn new(inner: Arc<dyn Signer>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            count: AtomicUsize::new(0),
        })
    }

    pub(crate) fn signatures(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for CountingSigner {
    fn public_key(&self) -> PublicKey {
        self.inner.public_key()
    }

    async fn sign(&self, digest: &[u8], algorithm: DigestAlgorithm) -> Result<Vec<u8>, SignerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.sign(digest, algorithm).await
    }
}

/// Clock that tests can advance explicitly.
pub(crate) struct StepClock(Mutex<DateTime<Utc>>);

impl StepClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().expect("clock lock") = now;
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock lock")
    }
}

/// A recorded request seen by a [`FakeRoundTripper`].
pub(crate) struct RecordedRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) headers: http::HeaderMap,
}

/// In-memory [`RoundTripper`] driven by a handler function, recording every
/// request it serves.
pub(crate) struct FakeRoundTripper {
    handler: Box<dyn Fn(&http::Request<Bytes>) -> http::Response<Bytes> + Send + Sync>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeRoundTripper {
    pub(crate) fn new(
        handler: impl Fn(&http::Request<Bytes>) -> http::Response<Bytes> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the recorded requests, usable after the transport has
    /// taken ownership of the round tripper.
    pub(crate) fn requests(&self) -> Arc<Mutex<Vec<RecordedRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl RoundTripper for FakeRoundTripper {
    async fn round_trip(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, AuthError> {
        self.requests
            .lock()
            .expect("request log lock")
            .push(RecordedRequest {
                method: request.method().to_string(),
                path: request.uri().path().to_string(),
                headers: request.headers().clone(),
            });
        Ok((self.handler)(&request))
    }
}

/// Build a JSON response with the given status.
pub(crate) fn json_response(status: u16, body: &serde_json::Value) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = http::StatusCode::from_u16(status).expect("status code");
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

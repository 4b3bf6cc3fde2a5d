//! Webhook delivery verification.
//!
//! The platform signs each delivery with HMAC-SHA256 over the raw body
//! using the hook's shared secret, carried in the `X-Hub-Signature-256`
//! header. [`verify_webhook`] checks the request shape, verifies the
//! signature in constant time and returns the delivery metadata.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::api;
use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// A verified webhook delivery.
///
/// Only produced by [`verify_webhook`]; the payload is the request body
/// exactly as received.
#[derive(Clone)]
pub struct WebHook {
    /// Hook id from `X-GitHub-Hook-ID`.
    pub id: String,

    /// Event type from `X-GitHub-Event`, for example `issues`.
    pub event: String,

    /// Raw request body, verbatim.
    pub payload: Bytes,

    /// Unique delivery id from `X-GitHub-Delivery`.
    pub delivery_id: String,

    /// Signature header value, including the `sha256=` prefix.
    pub signature: String,

    /// Installation id from `X-GitHub-Hook-Installation-Target-ID`. Can be
    /// fed to [`with_installation_id`](crate::options::with_installation_id)
    /// to build a transport for the installation the event came from.
    pub installation_id: u64,

    /// Installation target type, one of `repo`, `user` or `org`.
    pub installation_type: String,
}

impl std::fmt::Debug for WebHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebHook")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("delivery_id", &self.delivery_id)
            .field("installation_id", &self.installation_id)
            .field("installation_type", &self.installation_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Verify an inbound webhook delivery against the hook's shared secret.
///
/// Headers are expected in the canonical form the platform sends. Only
/// HMAC-SHA256 signatures are considered; a legacy SHA-1 signature header,
/// if present, is ignored. The secret is a string because hook secrets are
/// configured through a web form.
///
/// The checks run in order and the first failure wins:
///
/// 1. The method must be POST ([`WebhookError::Method`]).
/// 2. All required headers must be present and non-empty
///    ([`WebhookError::Request`] listing the missing set).
/// 3. The content type must be exactly `application/json`
///    ([`WebhookError::ContentType`]); form-encoded deliveries are not
///    supported.
/// 4. The installation target id must be a decimal integer and the
///    signature header must be `sha256=` followed by lowercase hex
///    ([`WebhookError::Request`]).
/// 5. The HMAC-SHA256 of the body must match, compared in constant time
///    ([`WebhookError::Signature`]).
///
/// The verifier writes no response; translate errors to HTTP statuses at
/// the edge:
///
/// ```no_run
/// # use bytes::Bytes;
/// # use github_app_auth::{verify_webhook, WebhookError};
/// # fn handle(secret: &str, request: &http::Request<Bytes>) -> u16 {
/// match verify_webhook(secret, request) {
///     Ok(_hook) => {
///         // Hand the event off for processing.
///         202
///     }
///     Err(WebhookError::Signature) => 401,
///     Err(WebhookError::Method { .. }) => 405,
///     Err(WebhookError::ContentType { .. }) => 415,
///     Err(WebhookError::Request { .. }) => 400,
/// }
/// # }
/// ```
pub fn verify_webhook(
    secret: &str,
    request: &http::Request<Bytes>,
) -> Result<WebHook, WebhookError> {
    if !request.method().as_str().eq_ignore_ascii_case("POST") {
        return Err(WebhookError::Method {
            method: request.method().to_string(),
        });
    }

    let headers = request.headers();
    let header_value = |name: &str| -> &str {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };

    const REQUIRED_HEADERS: [&str; 7] = [
        api::EVENT_HEADER,
        api::HOOK_ID_HEADER,
        api::DELIVERY_HEADER,
        api::TARGET_TYPE_HEADER,
        api::TARGET_ID_HEADER,
        "Content-Type",
        api::SIGNATURE_HEADER,
    ];
    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|name| header_value(name).is_empty())
        .collect();
    if !missing.is_empty() {
        return Err(WebhookError::Request {
            message: format!("missing header(s): {}", missing.join(", ")),
        });
    }

    let content_type = header_value("Content-Type");
    if content_type != api::CONTENT_TYPE_JSON {
        return Err(WebhookError::ContentType {
            content_type: content_type.to_string(),
        });
    }

    let installation_id: u64 = header_value(api::TARGET_ID_HEADER).parse().map_err(|_| {
        WebhookError::Request {
            message: format!("invalid {} header", api::TARGET_ID_HEADER),
        }
    })?;

    let signature = header_value(api::SIGNATURE_HEADER);
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return Err(WebhookError::Request {
            message: format!(
                "missing prefix sha256= from {} header",
                api::SIGNATURE_HEADER
            ),
        });
    };
    if signature_hex.bytes().any(|b| b.is_ascii_uppercase()) {
        return Err(WebhookError::Request {
            message: "signature is not lowercase hex encoded".to_string(),
        });
    }
    let untrusted = hex::decode(signature_hex).map_err(|_| WebhookError::Request {
        message: "signature is not hex encoded".to_string(),
    })?;

    let payload = request.body();

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::Request {
            message: "secret cannot be used as an HMAC key".to_string(),
        })?;
    mac.update(payload);

    // verify_slice compares in constant time; a mismatch reveals nothing
    // about how far the digests agree.
    if mac.verify_slice(&untrusted).is_err() {
        return Err(WebhookError::Signature);
    }

    Ok(WebHook {
        id: header_value(api::HOOK_ID_HEADER).to_string(),
        event: header_value(api::EVENT_HEADER).to_string(),
        payload: payload.clone(),
        delivery_id: header_value(api::DELIVERY_HEADER).to_string(),
        signature: signature.to_string(),
        installation_id,
        installation_type: header_value(api::TARGET_TYPE_HEADER).to_string(),
    })
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;

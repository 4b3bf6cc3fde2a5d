//! Tests for JWT minting and validity.

use super::*;
use crate::testutil::{rsa_2048, rsa_1024, test_signer, FailingSigner, UnsupportedKeySigner};
use chrono::TimeZone;
use rsa::Pkcs1v15Sign;
use sha2::Sha256;

fn minter() -> Rs256Minter {
    Rs256Minter::for_signer(test_signer()).expect("minter for 2048-bit RSA key")
}

fn decode_part(part: &str) -> Vec<u8> {
    URL_SAFE_NO_PAD.decode(part).expect("base64url decode")
}

#[tokio::test]
async fn test_minted_jwt_has_exact_header_and_payload() {
    // Arrange: a fixed instant with whole seconds
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    // Act
    let jwt = minter().mint(99, "", now).await.expect("mint");

    // Assert: three dot separated parts with the mandated content
    let parts: Vec<&str> = jwt.token().split('.').collect();
    assert_eq!(parts.len(), 3);

    let header = decode_part(parts[0]);
    assert_eq!(header, br#"{"alg":"RS256","typ":"JWT"}"#);

    let payload = decode_part(parts[1]);
    let expected = format!(
        r#"{{"iss":"99","iat":{},"exp":{}}}"#,
        now.timestamp() - 30,
        now.timestamp() + 120
    );
    assert_eq!(payload, expected.as_bytes());
}

#[tokio::test]
async fn test_minted_jwt_signature_verifies() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let jwt = minter().mint(99, "", now).await.expect("mint");

    let token = jwt.token();
    let signing_end = token.rfind('.').expect("signature separator");
    let signing_string = &token[..signing_end];
    let signature = decode_part(&token[signing_end + 1..]);

    let digest = Sha256::digest(signing_string.as_bytes());
    rsa_2048()
        .to_public_key()
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .expect("signature should verify against the signer's public key");
}

#[tokio::test]
async fn test_minted_lifetime_is_150_seconds() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let jwt = minter().mint(42, "", now).await.expect("mint");

    assert_eq!(jwt.issued_at(), now - Duration::seconds(30));
    assert_eq!(jwt.expires_at(), now + Duration::minutes(2));
    assert_eq!(jwt.expires_at() - jwt.issued_at(), Duration::seconds(150));
}

#[tokio::test]
async fn test_mint_truncates_fractional_seconds() {
    let now = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .unwrap()
        .checked_add_signed(Duration::milliseconds(750))
        .unwrap();

    let jwt = minter().mint(7, "", now).await.expect("mint");

    assert_eq!(jwt.issued_at().timestamp_subsec_millis(), 0);
    assert_eq!(jwt.issued_at().timestamp(), now.timestamp() - 30);
}

#[test]
fn test_validity_boundaries_around_the_one_minute_margin() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let jwt_expiring_at = |offset: i64| {
        Jwt::new(
            "token".to_string(),
            1,
            now - Duration::seconds(30),
            now + Duration::seconds(offset),
        )
    };

    // Valid only while more than sixty seconds of lifetime remain.
    assert!(!jwt_expiring_at(-1).is_valid_at(now));
    assert!(!jwt_expiring_at(0).is_valid_at(now));
    assert!(!jwt_expiring_at(59).is_valid_at(now));
    assert!(!jwt_expiring_at(60).is_valid_at(now));
    assert!(jwt_expiring_at(61).is_valid_at(now));
    assert!(jwt_expiring_at(120).is_valid_at(now));
}

#[test]
fn test_validity_requires_token_and_issuance_in_the_past() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let empty = Jwt::new(String::new(), 1, now - Duration::seconds(30), now + Duration::minutes(2));
    assert!(!empty.is_valid_at(now));

    let future = Jwt::new(
        "token".to_string(),
        1,
        now + Duration::seconds(1),
        now + Duration::minutes(2),
    );
    assert!(!future.is_valid_at(now));

    // Issued exactly now counts as issued.
    let fresh = Jwt::new("token".to_string(), 1, now, now + Duration::minutes(2));
    assert!(fresh.is_valid_at(now));
}

#[tokio::test]
async fn test_new_jwt_rejects_zero_app_id() {
    let err = new_jwt(0, test_signer()).await.expect_err("zero app id");
    assert!(matches!(err, AuthError::Options { .. }));
    assert!(err.to_string().contains("app id"));
}

#[tokio::test]
async fn test_new_jwt_rejects_small_rsa_keys() {
    let signer = Arc::new(crate::signer::LocalRsaSigner::new(rsa_1024().clone()));
    let err = new_jwt(99, signer).await.expect_err("1024-bit key");
    assert!(matches!(err, AuthError::Options { .. }));
    assert!(err.to_string().contains("2048"));
}

#[tokio::test]
async fn test_new_jwt_rejects_non_rsa_keys() {
    let err = new_jwt(99, Arc::new(UnsupportedKeySigner))
        .await
        .expect_err("non-RSA key");
    assert!(matches!(err, AuthError::Options { .. }));
    assert!(err.to_string().contains("unsupported key type: ed25519"));
}

#[tokio::test]
async fn test_signer_failure_surfaces_as_jwt_sign() {
    let err = new_jwt(99, Arc::new(FailingSigner))
        .await
        .expect_err("failing signer");
    assert!(matches!(err, AuthError::JwtSign(_)));
}

#[test]
fn test_debug_output_redacts_the_token() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let jwt = Jwt::new(
        "secret-token".to_string(),
        1,
        now - Duration::seconds(30),
        now + Duration::minutes(2),
    );

    let output = format!("{jwt:?}");
    assert!(output.contains("REDACTED"));
    assert!(!output.contains("secret-token"));
}

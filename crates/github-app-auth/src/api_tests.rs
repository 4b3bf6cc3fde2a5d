//! Tests for wire types and constants.

use super::*;
use serde_json::json;

#[test]
fn test_permission_levels_are_ordered() {
    assert!(PermissionLevel::Read < PermissionLevel::Write);
    assert!(PermissionLevel::Write < PermissionLevel::Admin);
    assert!(PermissionLevel::Read < PermissionLevel::Admin);
}

#[test]
fn test_permission_level_parses_known_values_only() {
    assert_eq!("read".parse::<PermissionLevel>(), Ok(PermissionLevel::Read));
    assert_eq!("write".parse::<PermissionLevel>(), Ok(PermissionLevel::Write));
    assert_eq!("admin".parse::<PermissionLevel>(), Ok(PermissionLevel::Admin));

    assert!("none".parse::<PermissionLevel>().is_err());
    assert!("Read".parse::<PermissionLevel>().is_err());
    assert!("".parse::<PermissionLevel>().is_err());
}

#[test]
fn test_token_request_omits_empty_collections() {
    let request = InstallationTokenRequest {
        repositories: Vec::new(),
        permissions: BTreeMap::new(),
    };
    let encoded = serde_json::to_string(&request).expect("encode");
    assert_eq!(encoded, "{}");
}

#[test]
fn test_token_request_encodes_scopes_and_repositories() {
    let mut permissions = BTreeMap::new();
    permissions.insert("contents".to_string(), "read".to_string());
    let request = InstallationTokenRequest {
        repositories: vec!["hello-world".to_string()],
        permissions,
    };

    let encoded: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&request).expect("encode")).expect("decode");
    assert_eq!(
        encoded,
        json!({"repositories": ["hello-world"], "permissions": {"contents": "read"}})
    );
}

#[test]
fn test_error_text_prefers_platform_message() {
    let body = br#"{"message": "Not Found", "documentation_url": "https://docs.github.com"}"#;
    let text = error_text(StatusCode::NOT_FOUND, body);
    assert_eq!(text, "Not Found(404 Not Found)");
}

#[test]
fn test_error_text_falls_back_to_status() {
    assert_eq!(
        error_text(StatusCode::BAD_GATEWAY, b"<html>oops</html>"),
        "502 Bad Gateway"
    );
    assert_eq!(error_text(StatusCode::BAD_GATEWAY, b"{}"), "502 Bad Gateway");
}

#[test]
fn test_installation_decodes_platform_shape() {
    let body = json!({
        "id": 99,
        "app_id": 1234,
        "account": {"login": "gh-user", "id": 5},
        "repository_selection": "selected",
        "permissions": {"contents": "write", "issues": "read"},
        "suspended_at": "2024-03-01T10:00:00Z"
    });

    let installation: Installation =
        serde_json::from_value(body).expect("decode installation");
    assert_eq!(installation.id, Some(99));
    assert_eq!(
        installation.account.and_then(|a| a.login).as_deref(),
        Some("gh-user")
    );
    assert_eq!(
        installation
            .permissions
            .as_ref()
            .and_then(|p| p.get("contents"))
            .map(String::as_str),
        Some("write")
    );
    assert!(installation.suspended_at.is_some());
}

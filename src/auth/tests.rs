//! Access control tests

use std::collections::HashMap;

use super::*;

fn creds(client_id: &str, username: Option<&str>) -> Credentials {
    Credentials {
        client_id: client_id.into(),
        username: username.map(|s| s.to_string()),
        peer_address: "127.0.0.1:1883".parse().unwrap(),
    }
}

fn provider() -> StaticAccessControl {
    let mut users = HashMap::new();
    users.insert(
        "alice".to_string(),
        StaticUser {
            password: "secret".to_string(),
            is_super: false,
            publish: vec!["sensors/%c/#".to_string()],
            subscribe: vec!["sensors/#".to_string()],
        },
    );
    users.insert(
        "root".to_string(),
        StaticUser {
            password: "toor".to_string(),
            is_super: true,
            ..Default::default()
        },
    );
    StaticAccessControl::new(users, false)
        .with_defaults(vec!["public/#".to_string()], vec!["public/#".to_string()])
}

#[tokio::test]
async fn authenticate_known_user() {
    let acl = provider();
    let is_super = acl
        .authenticate(&creds("c1", Some("alice")), Some(b"secret"))
        .await
        .unwrap();
    assert!(!is_super);
}

#[tokio::test]
async fn authenticate_superuser_flag() {
    let acl = provider();
    let is_super = acl
        .authenticate(&creds("c1", Some("root")), Some(b"toor"))
        .await
        .unwrap();
    assert!(is_super);
}

#[tokio::test]
async fn authenticate_wrong_password() {
    let acl = provider();
    let err = acl
        .authenticate(&creds("c1", Some("alice")), Some(b"nope"))
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::BadCredentials);
    assert_eq!(err.reason_code(), crate::protocol::ReasonCode::BadUserNameOrPassword);
}

#[tokio::test]
async fn anonymous_rejected_unless_allowed() {
    let acl = provider();
    assert_eq!(
        acl.authenticate(&creds("c1", None), None).await,
        Err(AuthError::BadCredentials)
    );

    let open = StaticAccessControl::new(HashMap::new(), true);
    assert_eq!(open.authenticate(&creds("c1", None), None).await, Ok(false));
}

#[tokio::test]
async fn acl_substitutes_client_id() {
    let acl = provider();
    let c = creds("dev42", Some("alice"));
    assert_eq!(
        acl.check_acl(&c, AclAction::Publish, "sensors/dev42/temp").await,
        Access::Allow
    );
    assert_eq!(
        acl.check_acl(&c, AclAction::Publish, "sensors/other/temp").await,
        Access::Deny
    );
}

#[tokio::test]
async fn acl_falls_back_to_defaults() {
    let acl = provider();
    // root has no patterns of its own
    let c = creds("c1", Some("root"));
    assert_eq!(
        acl.check_acl(&c, AclAction::Subscribe, "public/news").await,
        Access::Allow
    );
    assert_eq!(
        acl.check_acl(&c, AclAction::Subscribe, "private/x").await,
        Access::Deny
    );
}

#[tokio::test]
async fn allow_all_admits_everyone() {
    let acl = AllowAll;
    assert_eq!(acl.authenticate(&creds("c1", None), None).await, Ok(false));
    assert_eq!(
        acl.check_acl(&creds("c1", None), AclAction::Publish, "any").await,
        Access::Allow
    );
}

#[test]
fn pattern_matching_rules() {
    let matches = |pattern, topic| StaticAccessControl::pattern_allows(pattern, topic, "c1", None);
    assert!(matches("foo/bar", "foo/bar"));
    assert!(!matches("foo/bar", "foo/baz"));
    assert!(matches("foo/+/bar", "foo/x/bar"));
    assert!(!matches("foo/+", "foo/bar/baz"));
    assert!(matches("foo/#", "foo/bar/baz"));
    assert!(matches("foo/#", "foo"));
    assert!(matches("#", "anything"));
    assert!(!matches("foo/bar", "foo"));
}

#[test]
fn pattern_username_substitution() {
    assert!(StaticAccessControl::pattern_allows(
        "users/%u/data",
        "users/admin/data",
        "c1",
        Some("admin")
    ));
    assert!(!StaticAccessControl::pattern_allows(
        "users/%u/data",
        "users/admin/data",
        "c1",
        None
    ));
}

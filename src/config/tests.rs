//! Configuration tests

use pretty_assertions::assert_eq;

use super::*;
use crate::protocol::QoS;
use crate::zone::PeerCertAsUsername;

#[test]
fn defaults_when_empty() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.log.level, "info");
    assert!(config.zones.is_empty());

    let zone = config.zone("external");
    assert_eq!(zone.keepalive_backoff, 0.75);
    assert_eq!(zone.max_qos, QoS::ExactlyOnce);
}

#[test]
fn zone_table_parses() {
    let config = Config::parse(
        r#"
[log]
level = "debug"

[zones.external]
max_packet_size = 65536
max_clientid_len = 128
mountpoint = "devices/%c/"
enable_acl = true
keepalive_backoff = 0.5
peer_cert_as_username = "cn"
max_qos = 1
retain_available = false
server_keepalive = 30
"#,
    )
    .unwrap();

    assert_eq!(config.log.level, "debug");
    let zone = config.zone("external");
    assert_eq!(zone.max_packet_size, 65536);
    assert_eq!(zone.max_clientid_len, 128);
    assert_eq!(zone.mountpoint.as_deref(), Some("devices/%c/"));
    assert!(zone.enable_acl);
    assert_eq!(zone.keepalive_backoff, 0.5);
    assert_eq!(zone.peer_cert_as_username, PeerCertAsUsername::Cn);
    assert_eq!(zone.max_qos, QoS::AtLeastOnce);
    assert!(!zone.retain_available);
    assert_eq!(zone.server_keepalive, Some(30));
}

#[test]
fn partial_zone_keeps_defaults() {
    let config = Config::parse(
        r#"
[zones.internal]
enable_acl = true
"#,
    )
    .unwrap();

    let zone = config.zone("internal");
    assert!(zone.enable_acl);
    assert_eq!(zone.keepalive_backoff, 0.75);
    assert!(zone.mountpoint.is_none());
    assert!(zone.retain_available);
}

#[test]
fn validation_rejects_bad_backoff() {
    let result = Config::parse(
        r#"
[zones.bad]
keepalive_backoff = 0.0
"#,
    );
    assert!(matches!(result, Err(ConfigError::Validation(_))));

    let result = Config::parse(
        r#"
[zones.bad]
keepalive_backoff = 1.5
"#,
    );
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn validation_rejects_zero_limits() {
    let result = Config::parse(
        r#"
[zones.bad]
max_packet_size = 0
"#,
    );
    assert!(matches!(result, Err(ConfigError::Validation(_))));

    let result = Config::parse(
        r#"
[zones.bad]
max_clientid_len = 0
"#,
    );
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn env_var_substitution() {
    std::env::set_var("GATEMQ_TEST_MOUNTPOINT", "bridge/");
    let content = r#"
[zones.z]
mountpoint = "${GATEMQ_TEST_MOUNTPOINT}"
max_clientid_len = ${GATEMQ_TEST_UNSET_LEN:-23}
"#;
    let expanded = expand_env_refs(content);
    std::env::remove_var("GATEMQ_TEST_MOUNTPOINT");

    let config = Config::parse(&expanded).unwrap();
    let zone = config.zone("z");
    assert_eq!(zone.mountpoint.as_deref(), Some("bridge/"));
    assert_eq!(zone.max_clientid_len, 23);
}

#[test]
fn parse_error_is_reported() {
    assert!(matches!(
        Config::parse("log = \"not a table\""),
        Err(ConfigError::Parse(_))
    ));
}

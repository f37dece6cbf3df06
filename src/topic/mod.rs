//! Topic names, topic filters and mountpoints
//!
//! Validation follows the MQTT rules on topic names and filters:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Multi-level wildcard (#) must occupy the last, entire level
//! - Single-level wildcard (+) must occupy an entire level
//! - Shared subscriptions ($share/{group}/{filter}) carry their group
//!   out-of-band; the group name itself must be wildcard-free

use crate::protocol::SubscriptionOptions;

/// Topic and filter strings share this ceiling from their two-byte
/// length prefix on the wire.
const MAX_TOPIC_LEN: usize = u16::MAX as usize;

fn check_encodable(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        return Err("must not be empty");
    }
    if s.len() > MAX_TOPIC_LEN {
        return Err("longer than 65535 bytes");
    }
    if s.contains('\0') {
        return Err("contains a null byte");
    }
    Ok(())
}

/// Validate a topic name (used in PUBLISH)
pub fn validate_name(topic: &str, max_levels: usize) -> Result<(), &'static str> {
    check_encodable(topic)?;
    if has_wildcards(topic) {
        return Err("wildcards are not allowed in a topic name");
    }
    if max_levels > 0 && topic.split('/').count() > max_levels {
        return Err("too many topic levels");
    }
    Ok(())
}

/// Validate a topic filter (used in SUBSCRIBE/UNSUBSCRIBE)
pub fn validate_filter(filter: &str, max_levels: usize) -> Result<(), &'static str> {
    check_encodable(filter)?;

    let routable = if filter.starts_with("$share/") {
        let (group, inner) = split_share(filter).ok_or("$share needs a group and a filter")?;
        if group.is_empty() || inner.is_empty() {
            return Err("$share needs a group and a filter");
        }
        if has_wildcards(group) {
            return Err("$share group must not contain wildcards");
        }
        inner
    } else {
        filter
    };

    if max_levels > 0 && routable.split('/').count() > max_levels {
        return Err("too many filter levels");
    }

    let mut levels = routable.split('/').peekable();
    while let Some(level) = levels.next() {
        match level {
            "#" if levels.peek().is_some() => {
                return Err("# must terminate the filter");
            }
            "#" | "+" => {}
            _ if has_wildcards(level) => {
                return Err("a wildcard must stand alone in its level");
            }
            _ => {}
        }
    }

    Ok(())
}

/// Check whether a filter contains MQTT wildcards
pub fn has_wildcards(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

fn split_share(filter: &str) -> Option<(&str, &str)> {
    let rest = filter.strip_prefix("$share/")?;
    let slash = rest.find('/')?;
    Some((&rest[..slash], &rest[slash + 1..]))
}

/// A subscription filter after parsing: share group split off the raw
/// filter, topic-derived options merged over the packet's options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilter {
    pub filter: String,
    pub share_group: Option<String>,
    pub options: SubscriptionOptions,
}

/// Parse a raw subscription filter into its routable form.
///
/// `$share/{group}/{filter}` yields the inner filter with the group
/// carried separately; shared subscriptions never echo back to the
/// publisher, so no_local is forced off for them.
pub fn parse(raw: &str, options: SubscriptionOptions) -> Result<ParsedFilter, &'static str> {
    validate_filter(raw, 0)?;

    match split_share(raw) {
        Some((group, actual)) => {
            let mut options = options;
            options.no_local = false;
            Ok(ParsedFilter {
                filter: actual.to_string(),
                share_group: Some(group.to_string()),
                options,
            })
        }
        None => Ok(ParsedFilter {
            filter: raw.to_string(),
            share_group: None,
            options,
        }),
    }
}

/// A resolved topic prefix applied to everything a connection publishes
/// or subscribes to, and stripped again on outbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mountpoint(String);

impl Mountpoint {
    /// Expand a mountpoint template, substituting `%c` with the client
    /// identifier and `%u` with the username (empty when undefined).
    pub fn expand(template: &str, client_id: &str, username: Option<&str>) -> Self {
        let resolved = template
            .replace("%c", client_id)
            .replace("%u", username.unwrap_or(""));
        Mountpoint(resolved)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prepend the mountpoint to a topic
    pub fn prepend(&self, topic: &str) -> String {
        let mut mounted = String::with_capacity(self.0.len() + topic.len());
        mounted.push_str(&self.0);
        mounted.push_str(topic);
        mounted
    }

    /// Strip the mountpoint from a topic; passes the topic through
    /// unchanged when the prefix does not match.
    pub fn strip<'a>(&self, topic: &'a str) -> &'a str {
        topic.strip_prefix(self.0.as_str()).unwrap_or(topic)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::protocol::QoS;

    #[test]
    fn name_rejects_wildcards_and_empty() {
        assert!(validate_name("a/b", 0).is_ok());
        assert!(validate_name("", 0).is_err());
        assert!(validate_name("a/+/b", 0).is_err());
        assert!(validate_name("a/#", 0).is_err());
        assert!(validate_name("a\0b", 0).is_err());
    }

    #[test]
    fn name_respects_max_levels() {
        assert!(validate_name("a/b/c", 3).is_ok());
        assert!(validate_name("a/b/c/d", 3).is_err());
    }

    #[test_case("#" ; "hash")]
    #[test_case("a/#" ; "a_hash")]
    #[test_case("a/+/b" ; "a_plus_b")]
    #[test_case("$share/g/sensors/#" ; "share_group")]
    fn well_formed_filters(filter: &str) {
        assert!(validate_filter(filter, 0).is_ok());
    }

    #[test_case("a/#/b" ; "hash_in_middle")]
    #[test_case("a/b#" ; "trailing_hash_no_slash")]
    #[test_case("a/b+" ; "trailing_plus_no_slash")]
    #[test_case("a\0b" ; "nul_byte")]
    fn ill_formed_filters(filter: &str) {
        assert!(validate_filter(filter, 0).is_err());
    }

    #[test]
    fn shared_subscription_parse() {
        let parsed = parse(
            "$share/group1/metrics/#",
            SubscriptionOptions {
                qos: QoS::AtLeastOnce,
                no_local: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(parsed.filter, "metrics/#");
        assert_eq!(parsed.share_group.as_deref(), Some("group1"));
        // no_local forced off for shared subscriptions
        assert!(!parsed.options.no_local);
        assert_eq!(parsed.options.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn shared_subscription_bad_group() {
        assert!(parse("$share//x", SubscriptionOptions::default()).is_err());
        assert!(parse("$share/+/x", SubscriptionOptions::default()).is_err());
        assert!(parse("$share/g", SubscriptionOptions::default()).is_err());
    }

    #[test]
    fn mountpoint_expand_and_roundtrip() {
        let mp = Mountpoint::expand("u/%c/", "alice", None);
        assert_eq!(mp.as_str(), "u/alice/");
        assert_eq!(mp.prepend("t"), "u/alice/t");
        assert_eq!(mp.strip("u/alice/t"), "t");
        // Unmatched prefix passes through
        assert_eq!(mp.strip("other/t"), "other/t");
    }

    #[test]
    fn mountpoint_username_substitution() {
        let mp = Mountpoint::expand("%u/%c/", "c1", Some("bob"));
        assert_eq!(mp.as_str(), "bob/c1/");
        let mp = Mountpoint::expand("%u/", "c1", None);
        assert_eq!(mp.as_str(), "/");
    }
}

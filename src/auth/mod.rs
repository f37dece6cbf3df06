//! Access control
//!
//! One collaborator covers both halves of access control: connection
//! authentication (yielding the superuser flag) and per-topic ACL checks
//! for publish and subscribe. The engine skips ACL entirely for
//! superusers and for zones with ACL disabled.
//!
//! ACL patterns support MQTT wildcards plus `%c` (client id) and `%u`
//! (username) substitution. Pluggable back-ends are out of scope; the
//! in-memory `StaticAccessControl` covers embedded use and tests.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::ReasonCode;

#[cfg(test)]
mod tests;

/// Identity of the connection being checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: Arc<str>,
    pub username: Option<String>,
    pub peer_address: SocketAddr,
}

/// What the client is trying to do with a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Publish,
    Subscribe,
}

/// ACL verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong password
    BadCredentials,
    /// Known identity, connection refused
    NotAuthorized,
    /// Back-end unreachable
    Unavailable,
}

impl AuthError {
    /// CONNACK reason code this failure maps to
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            AuthError::BadCredentials => ReasonCode::BadUserNameOrPassword,
            AuthError::NotAuthorized => ReasonCode::NotAuthorized,
            AuthError::Unavailable => ReasonCode::ServerUnavailable,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadCredentials => write!(f, "bad user name or password"),
            AuthError::NotAuthorized => write!(f, "not authorized"),
            AuthError::Unavailable => write!(f, "authentication back-end unavailable"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Authentication + topic authorization, as one collaborator
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Authenticate a connecting client. `Ok(true)` marks a superuser
    /// that bypasses all ACL checks.
    async fn authenticate(
        &self,
        credentials: &Credentials,
        password: Option<&[u8]>,
    ) -> Result<bool, AuthError>;

    /// Check whether the client may publish to or subscribe on a topic
    async fn check_acl(&self, credentials: &Credentials, action: AclAction, topic: &str)
        -> Access;
}

/// Access control that admits everyone and allows every topic
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn authenticate(
        &self,
        _credentials: &Credentials,
        _password: Option<&[u8]>,
    ) -> Result<bool, AuthError> {
        Ok(false)
    }

    async fn check_acl(
        &self,
        _credentials: &Credentials,
        _action: AclAction,
        _topic: &str,
    ) -> Access {
        Access::Allow
    }
}

/// One user entry in the static table
#[derive(Debug, Clone, Default)]
pub struct StaticUser {
    pub password: String,
    pub is_super: bool,
    /// Publish patterns; empty means fall back to the defaults
    pub publish: Vec<String>,
    /// Subscribe patterns; empty means fall back to the defaults
    pub subscribe: Vec<String>,
}

/// In-memory access control with a fixed user table
pub struct StaticAccessControl {
    users: HashMap<String, StaticUser>,
    allow_anonymous: bool,
    /// Patterns applied to users without their own, anonymous included
    default_publish: Vec<String>,
    default_subscribe: Vec<String>,
}

impl StaticAccessControl {
    pub fn new(users: HashMap<String, StaticUser>, allow_anonymous: bool) -> Self {
        Self {
            users,
            allow_anonymous,
            default_publish: Vec::new(),
            default_subscribe: Vec::new(),
        }
    }

    pub fn with_defaults(mut self, publish: Vec<String>, subscribe: Vec<String>) -> Self {
        self.default_publish = publish;
        self.default_subscribe = subscribe;
        self
    }

    fn patterns_for(&self, credentials: &Credentials, action: AclAction) -> &[String] {
        let user_patterns = credentials
            .username
            .as_deref()
            .and_then(|u| self.users.get(u))
            .map(|user| match action {
                AclAction::Publish => &user.publish,
                AclAction::Subscribe => &user.subscribe,
            });

        match user_patterns {
            Some(patterns) if !patterns.is_empty() => patterns,
            _ => match action {
                AclAction::Publish => &self.default_publish,
                AclAction::Subscribe => &self.default_subscribe,
            },
        }
    }

    /// Substitute %c/%u into a pattern, then match it against the topic
    fn pattern_allows(
        pattern: &str,
        topic: &str,
        client_id: &str,
        username: Option<&str>,
    ) -> bool {
        let resolved = pattern
            .replace("%c", client_id)
            .replace("%u", username.unwrap_or(""));

        let pattern_levels: Vec<&str> = resolved.split('/').collect();
        let topic_levels: Vec<&str> = topic.split('/').collect();
        Self::levels_match(&pattern_levels, &topic_levels)
    }

    /// Wildcard match over split levels: `+` covers exactly one level,
    /// a `#` tail covers everything from there down.
    fn levels_match(pattern: &[&str], topic: &[&str]) -> bool {
        match (pattern.first(), topic.first()) {
            (Some(&"#"), _) => true,
            (None, None) => true,
            (Some(&p), Some(&t)) if p == "+" || p == t => {
                Self::levels_match(&pattern[1..], &topic[1..])
            }
            _ => false,
        }
    }
}

#[async_trait]
impl AccessControl for StaticAccessControl {
    async fn authenticate(
        &self,
        credentials: &Credentials,
        password: Option<&[u8]>,
    ) -> Result<bool, AuthError> {
        let username = match credentials.username.as_deref() {
            Some(u) => u,
            None => {
                return if self.allow_anonymous {
                    Ok(false)
                } else {
                    Err(AuthError::BadCredentials)
                };
            }
        };

        let user = self
            .users
            .get(username)
            .ok_or(AuthError::BadCredentials)?;

        let supplied = password.unwrap_or(&[]);
        if std::str::from_utf8(supplied).map(|p| p == user.password) != Ok(true) {
            return Err(AuthError::BadCredentials);
        }

        Ok(user.is_super)
    }

    async fn check_acl(
        &self,
        credentials: &Credentials,
        action: AclAction,
        topic: &str,
    ) -> Access {
        let username = credentials.username.as_deref();
        let allowed = self
            .patterns_for(credentials, action)
            .iter()
            .any(|p| Self::pattern_allows(p, topic, &credentials.client_id, username));

        if allowed {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

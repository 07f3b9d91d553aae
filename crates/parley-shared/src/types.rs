use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::PRIVATE_ROOM_PREFIX;

// Opaque, stable user identifier assigned by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier.
///
/// Group rooms use a human-shareable numeric code. Private 1:1 rooms use the
/// deterministic composite form `private-{lo}-{hi}` where `lo`/`hi` are the
/// two participant ids in sorted order, so the id is a pure function of the
/// pair and at most one private room can exist for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Deterministic id of the private room between two users.
    pub fn private_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self(format!("{PRIVATE_ROOM_PREFIX}{lo}-{hi}"))
    }

    pub fn is_private(&self) -> bool {
        self.0.starts_with(PRIVATE_ROOM_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform-wide role of a registered user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Group,
    Private,
}

/// Origin of a message. `senderName` on the message disambiguates which
/// user spoke; this tag alone does not identify a person.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
}

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Alert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_pair_is_order_independent() {
        let a = UserId("alice".into());
        let b = UserId("bob".into());
        assert_eq!(RoomId::private_pair(&a, &b), RoomId::private_pair(&b, &a));
        assert_eq!(RoomId::private_pair(&a, &b).as_str(), "private-alice-bob");
    }

    #[test]
    fn private_pair_is_private() {
        let a = UserId("a".into());
        let b = UserId("b".into());
        assert!(RoomId::private_pair(&a, &b).is_private());
        assert!(!RoomId("1234567".into()).is_private());
    }

    #[test]
    fn role_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"USER\"");
    }

    #[test]
    fn origin_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Origin::Ai).unwrap(), "\"ai\"");
        assert_eq!(serde_json::to_string(&Origin::System).unwrap(), "\"system\"");
    }
}

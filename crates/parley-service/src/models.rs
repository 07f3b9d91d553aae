//! Domain model structs persisted as store documents.
//!
//! Every struct derives `Serialize` and `Deserialize` so it converts
//! directly to and from [`parley_store::Document`] maps. Array-typed
//! fields carry set semantics enforced through `Patch::Union` /
//! `Patch::Remove`, never whole-array rewrites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::types::{
    LogLevel, MessageId, MessageKind, Origin, RoomId, RoomKind, Role, UserId,
};

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Collection of [`User`] documents.
pub const USERS: &str = "users";

/// Collection of [`Room`] documents.
pub const ROOMS: &str = "rooms";

/// Collection of [`LogEntry`] documents.
pub const SYSTEM_LOGS: &str = "system_logs";

/// Per-room message sub-collection. Messages live outside the room
/// document so read receipts can be patched atomically per message.
pub fn room_messages(room_id: &RoomId) -> String {
    format!("rooms/{room_id}/messages")
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.
///
/// `friends` is symmetric after any accepted request; `friend_requests`
/// holds inbound requester ids only. Neither ever contains the user's own
/// id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Opaque id assigned by the identity provider.
    pub id: UserId,
    /// Unique display name; lookups are exact and case-sensitive.
    pub username: String,
    /// Opaque credential verifier. Never the raw secret.
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub friends: Vec<UserId>,
    #[serde(default)]
    pub friend_requests: Vec<UserId>,
    pub last_login: Option<DateTime<Utc>>,
    /// Append-only login timestamps, oldest first.
    #[serde(default)]
    pub login_history: Vec<DateTime<Utc>>,
}

impl User {
    pub fn is_friend(&self, id: &UserId) -> bool {
        self.friends.contains(id)
    }

    pub fn has_pending_request_from(&self, id: &UserId) -> bool {
        self.friend_requests.contains(id)
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A conversation room.
///
/// Invariant: `banned_users` and `participants` are disjoint; banning
/// always evicts in the same write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub kind: RoomKind,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub banned_users: Vec<UserId>,
    /// Muted users stay participants but lose send capability.
    #[serde(default)]
    pub muted_users: Vec<UserId>,
    /// Tombstone; the store contract has no document delete.
    #[serde(default)]
    pub deleted: bool,
}

impl Room {
    pub fn is_participant(&self, id: &UserId) -> bool {
        self.participants.contains(id)
    }

    pub fn is_banned(&self, id: &UserId) -> bool {
        self.banned_users.contains(id)
    }

    pub fn is_muted(&self, id: &UserId) -> bool {
        self.muted_users.contains(id)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Immutable once appended except for monotonic
/// growth of `read_by`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Origin tag; not a user reference for `ai` / `system`.
    pub sender: Origin,
    /// Display label. For user messages this is the username and is what
    /// distinguishes one speaker from another.
    pub sender_name: String,
    /// Ciphertext envelope or plaintext, per `is_encrypted`.
    pub content: String,
    pub is_encrypted: bool,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    /// Users who have acknowledged this message.
    #[serde(default)]
    pub read_by: Vec<UserId>,
}

impl Message {
    /// A freshly sealed user message.
    pub fn user_text(sender_name: &str, content: String, is_encrypted: bool) -> Self {
        Self {
            id: MessageId::new(),
            sender: Origin::User,
            sender_name: sender_name.to_string(),
            content,
            is_encrypted,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            file_name: None,
            file_size: None,
            read_by: Vec::new(),
        }
    }

    /// A system-origin notice (moderation confirmations, failures).
    pub fn system(content: String, is_encrypted: bool) -> Self {
        Self {
            id: MessageId::new(),
            sender: Origin::System,
            sender_name: "system".to_string(),
            content,
            is_encrypted,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            file_name: None,
            file_size: None,
            read_by: Vec::new(),
        }
    }

    /// An assistant response.
    pub fn assistant(content: String, is_encrypted: bool) -> Self {
        Self {
            id: MessageId::new(),
            sender: Origin::Ai,
            sender_name: "assistant".to_string(),
            content,
            is_encrypted,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
            file_name: None,
            file_size: None,
            read_by: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// System log
// ---------------------------------------------------------------------------

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Short event tag, e.g. `login` or `moderation`.
    pub event: String,
    pub details: String,
    pub level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::{from_document, to_document};

    #[test]
    fn user_document_roundtrip() {
        let user = User {
            id: UserId("u1".into()),
            username: "alice".into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
            created_at: Utc::now(),
            friends: vec![UserId("u2".into())],
            friend_requests: vec![],
            last_login: None,
            login_history: vec![],
        };

        let doc = to_document(&user).unwrap();
        assert_eq!(doc.get("username").unwrap(), "alice");
        assert_eq!(doc.get("role").unwrap(), "USER");

        let back: User = from_document(doc).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn room_defaults_apply_to_missing_arrays() {
        let doc = to_document(&serde_json::json!({
            "id": "1234567",
            "name": "general",
            "kind": "group",
            "creator_id": "u1",
            "created_at": Utc::now(),
        }))
        .unwrap();

        let room: Room = from_document(doc).unwrap();
        assert!(room.participants.is_empty());
        assert!(room.banned_users.is_empty());
        assert!(!room.deleted);
    }

    #[test]
    fn message_helpers_tag_origin() {
        assert_eq!(Message::system("x".into(), false).sender, Origin::System);
        assert_eq!(Message::assistant("x".into(), false).sender, Origin::Ai);
        assert_eq!(
            Message::user_text("alice", "x".into(), true).sender,
            Origin::User
        );
    }
}

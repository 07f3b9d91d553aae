//! Events and view models published to the UI collaborator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::envelope::Envelope;
use parley_shared::types::{MessageKind, Origin, RoomId, UserId};
use parley_service::{LogEntry, Message, Room, User};

/// A message as the UI sees it: content already opened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: String,
    pub sender: Origin,
    pub sender_name: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub read_by: Vec<UserId>,
}

impl ChatView {
    pub fn from_message(message: Message, envelope: &Envelope) -> Self {
        // `open` is total, so legacy plaintext rows pass through untouched
        // whatever `is_encrypted` claims.
        let content = envelope.open(&message.content);
        Self {
            id: message.id.to_string(),
            sender: message.sender,
            sender_name: message.sender_name,
            content,
            kind: message.kind,
            timestamp: message.timestamp,
            file_name: message.file_name,
            file_size: message.file_size,
            read_by: message.read_by,
        }
    }
}

/// Why a session was forced out of its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionReason {
    Banned,
    Kicked,
    RoomDeleted,
}

impl EvictionReason {
    /// Human-readable notice shown to the evicted user.
    pub fn notice(self) -> &'static str {
        match self {
            EvictionReason::Banned => "You have been banned from this room",
            EvictionReason::Kicked => "You have been removed from this room",
            EvictionReason::RoomDeleted => "This room no longer exists",
        }
    }
}

/// Everything the orchestrator pushes to the UI collaborator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Fresh snapshot of the signed-in user's own record.
    Profile(User),

    /// Fresh snapshot of the rooms the user participates in.
    Rooms(Vec<Room>),

    /// Fresh ordered snapshot of the current room's messages.
    Messages(Vec<ChatView>),

    /// The server side removed this session from its room.
    Evicted {
        room_id: RoomId,
        reason: EvictionReason,
    },

    /// Recent audit records, for administrative surfaces.
    Audit(Vec<LogEntry>),
}

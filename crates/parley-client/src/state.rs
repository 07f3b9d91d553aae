//! Per-session state.

use tokio::task::JoinHandle;

use parley_shared::types::RoomId;
use parley_service::{Principal, Room};

/// Lifecycle of one client session.
///
/// `Anonymous -> Authenticating -> Authenticated -> InRoom`, with the
/// reverse edges on logout, typed login failure, voluntary room close and
/// server-driven eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    InRoom(RoomId),
}

/// Mutable session view state. Everything here is transient; the backing
/// store stays authoritative.
pub(crate) struct SessionState {
    pub phase: SessionPhase,
    pub principal: Option<Principal>,

    /// Latest room snapshot delivered by the room subscription. Only
    /// consulted for the lifetime of that subscription, never cached
    /// across sessions.
    pub current_room: Option<Room>,

    pub profile_task: Option<JoinHandle<()>>,
    pub rooms_task: Option<JoinHandle<()>>,
    pub room_doc_task: Option<JoinHandle<()>>,
    pub room_feed_task: Option<JoinHandle<()>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            principal: None,
            current_room: None,
            profile_task: None,
            rooms_task: None,
            room_doc_task: None,
            room_feed_task: None,
        }
    }

    /// Cancel the room-scoped subscriptions (switching or closing rooms).
    pub fn abort_room_tasks(&mut self) {
        for handle in [self.room_doc_task.take(), self.room_feed_task.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        self.current_room = None;
    }

    /// Cancel every live subscription this session holds.
    pub fn abort_all_tasks(&mut self) {
        self.abort_room_tasks();
        for handle in [self.profile_task.take(), self.rooms_task.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    /// Return to `Anonymous` with no residual view state.
    pub fn reset(&mut self) {
        self.abort_all_tasks();
        self.phase = SessionPhase::Anonymous;
        self.principal = None;
        self.current_room = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

//! The session orchestrator.
//!
//! Receives user intents, validates them against the identity and room
//! services, mutates the store through those services, and keeps the
//! session's view state consistent through live subscriptions. It owns no
//! persistent state of its own.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use parley_shared::command::Outgoing;
use parley_shared::constants::AUDIT_WINDOW;
use parley_shared::envelope::Envelope;
use parley_shared::types::{LogLevel, MessageKind, RoomId, UserId};
use parley_service::models::{ROOMS, USERS};
use parley_service::{
    AuditLog, Authenticator, IdentityStore, Message, MessageLog, Principal, Room, RoomRegistry,
    ServiceError, User,
};
use parley_store::{from_document, Filter, Store, WatchTarget};

use crate::config::CoreConfig;
use crate::error::SessionError;
use crate::events::{ChatView, EvictionReason, SessionEvent};
use crate::generate::{GenerationError, Generator};
use crate::state::{SessionPhase, SessionState};

/// One live client session.
///
/// Construct with [`SessionOrchestrator::new`], which also returns the
/// event stream the UI collaborator consumes.
pub struct SessionOrchestrator {
    store: Arc<dyn Store>,
    identity: IdentityStore,
    rooms: RoomRegistry,
    messages: MessageLog,
    audit: AuditLog,
    envelope: Envelope,
    generator: Option<Arc<dyn Generator>>,
    config: CoreConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Mutex<SessionState>,
}

impl SessionOrchestrator {
    /// Wire a session over an explicitly constructed store client and
    /// identity collaborator. No module-level singletons are involved;
    /// the store handle's lifetime is the caller's decision.
    pub fn new(
        store: Arc<dyn Store>,
        auth: Arc<dyn Authenticator>,
        generator: Option<Arc<dyn Generator>>,
        config: CoreConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let audit = AuditLog::new(store.clone());
        let rooms = RoomRegistry::new(store.clone(), audit.clone());
        let identity = IdentityStore::new(
            store.clone(),
            auth,
            rooms.clone(),
            audit.clone(),
            Some(config.operator_credentials()),
        );
        let messages = MessageLog::new(store.clone());
        let envelope = config.envelope();

        let (events, events_rx) = mpsc::unbounded_channel();

        let orchestrator = Arc::new(Self {
            store,
            identity,
            rooms,
            messages,
            audit,
            envelope,
            generator,
            config,
            events,
            state: Mutex::new(SessionState::new()),
        });

        (orchestrator, events_rx)
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Register a new account and sign in as it.
    pub async fn register(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<Principal, SessionError> {
        self.lock_state().reset();

        match timeout(
            self.config.connect_timeout,
            self.identity.register(username, password),
        )
        .await
        {
            Err(_) => Err(SessionError::Connectivity),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) => self.login(username, password).await,
        }
    }

    /// Sign in. On failure the session returns to `Anonymous` and the
    /// typed error is handed back for rendering.
    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<Principal, SessionError> {
        {
            let mut state = self.lock_state();
            if state.phase != SessionPhase::Anonymous {
                state.reset();
            }
            state.phase = SessionPhase::Authenticating;
        }

        let principal = match timeout(
            self.config.connect_timeout,
            self.identity.authenticate(username, password),
        )
        .await
        {
            Err(_) => {
                self.lock_state().reset();
                return Err(SessionError::Connectivity);
            }
            Ok(Err(e)) => {
                self.lock_state().reset();
                return Err(e.into());
            }
            Ok(Ok(principal)) => principal,
        };

        match timeout(
            self.config.connect_timeout,
            self.identity.record_login(&principal),
        )
        .await
        {
            Err(_) => {
                self.lock_state().reset();
                return Err(SessionError::Connectivity);
            }
            Ok(Err(e)) => {
                self.lock_state().reset();
                return Err(e.into());
            }
            Ok(Ok(())) => {}
        }

        {
            let mut state = self.lock_state();
            state.phase = SessionPhase::Authenticated;
            state.principal = Some(principal.clone());
        }

        // The operator has no record and no room membership documents;
        // subscribing on its behalf would watch nothing that exists.
        if let Some(user_id) = principal.user_id() {
            let user_id = user_id.clone();
            if let Err(e) = self.spawn_profile_watch(user_id.clone()).await {
                self.lock_state().reset();
                return Err(e);
            }
            if let Err(e) = self.spawn_rooms_watch(user_id).await {
                self.lock_state().reset();
                return Err(e);
            }
        }

        info!(user = principal.display_name(), "session authenticated");
        Ok(principal)
    }

    /// End the session, releasing every live subscription.
    pub async fn logout(&self) {
        let name = {
            let mut state = self.lock_state();
            let name = state
                .principal
                .as_ref()
                .map(|p| p.display_name().to_string());
            state.reset();
            name
        };

        if let Some(name) = name {
            info!(user = %name, "session ended");
            self.audit
                .record(LogLevel::Info, "logout", format!("{name} logged out"))
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    /// Create a group room. The creator still joins it explicitly.
    pub async fn create_room(&self, name: &str) -> Result<Room, SessionError> {
        let principal = self.current_principal()?;
        let Some(user_id) = principal.user_id() else {
            return Err(SessionError::NotAuthenticated);
        };
        Ok(self.rooms.create_group(name, user_id).await?)
    }

    /// Enter a room, superseding any room this session was already in.
    pub async fn join_room(self: &Arc<Self>, room_id: &RoomId) -> Result<Room, SessionError> {
        let principal = self.current_principal()?;
        let room = self.rooms.join(room_id, &principal).await?;

        {
            let mut state = self.lock_state();
            // Cancel the previous room's subscriptions before the new
            // ones exist, never after.
            state.abort_room_tasks();
            state.phase = SessionPhase::InRoom(room.id.clone());
            state.current_room = Some(room.clone());
        }

        self.spawn_room_watch(room.id.clone(), principal.clone())
            .await?;
        self.spawn_feed(room.id.clone(), principal).await?;

        Ok(room)
    }

    /// Close the room view without giving up membership.
    pub fn close_room(&self) {
        let mut state = self.lock_state();
        state.abort_room_tasks();
        if matches!(state.phase, SessionPhase::InRoom(_)) {
            state.phase = SessionPhase::Authenticated;
        }
    }

    /// Leave the current room: membership is removed, then the view
    /// closes.
    pub async fn leave_room(&self) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;
        if let Some(user_id) = principal.user_id() {
            self.rooms.leave(&room_id, user_id).await?;
        }
        self.close_room();
        Ok(())
    }

    /// Tombstone the current room. Allowed for its creator and for
    /// administrators; everyone inside is evicted by their own room
    /// subscription.
    pub async fn delete_room(&self) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;
        self.rooms.delete(&room_id, &principal).await?;
        self.close_room();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Handle one line of send-box input.
    ///
    /// Moderation commands are dispatched to the room registry and only
    /// their confirmation is persisted, as a system message. Chat text is
    /// sealed and appended; an assistant invocation runs afterwards on its
    /// own task so it can never delay the user's message.
    pub async fn send_message(self: &Arc<Self>, input: &str) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;

        match Outgoing::parse(input) {
            Outgoing::Unknown { command } => Err(SessionError::UnknownCommand(command)),

            Outgoing::Moderation { action, target } => {
                let confirmation = self
                    .rooms
                    .moderate(&room_id, &principal, action, &target)
                    .await?;

                let sealed = self.envelope.seal(&confirmation)?;
                self.messages
                    .append(&room_id, &Message::system(sealed, true))
                    .await?;
                Ok(())
            }

            Outgoing::Chat {
                text,
                assistant_prompt,
            } => {
                self.ensure_can_send(&principal)?;

                let sealed = self.envelope.seal(&text)?;
                let message = Message::user_text(principal.display_name(), sealed, true);
                self.messages.append(&room_id, &message).await?;

                self.audit
                    .record(
                        LogLevel::Info,
                        "message_send",
                        format!("{} in {room_id}", principal.display_name()),
                    )
                    .await;

                if let Some(prompt) = assistant_prompt {
                    self.spawn_assistant(room_id, prompt);
                }
                Ok(())
            }
        }
    }

    /// Send a file-backed message. `content` is the provider reference to
    /// the uploaded bytes, sealed like any other content.
    pub async fn send_attachment(
        &self,
        kind: MessageKind,
        content: &str,
        file_name: &str,
        file_size: u64,
    ) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;
        self.ensure_can_send(&principal)?;

        let sealed = self.envelope.seal(content)?;
        let mut message = Message::user_text(principal.display_name(), sealed, true);
        message.kind = kind;
        message.file_name = Some(file_name.to_string());
        message.file_size = Some(file_size);

        self.messages.append(&room_id, &message).await?;
        self.audit
            .record(
                LogLevel::Info,
                "message_send",
                format!(
                    "{} sent {file_name} to {room_id}",
                    principal.display_name()
                ),
            )
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    pub async fn send_friend_request(&self, to_username: &str) -> Result<(), SessionError> {
        let principal = self.current_principal()?;
        let Some(user_id) = principal.user_id() else {
            return Err(SessionError::NotAuthenticated);
        };
        self.identity
            .send_friend_request(user_id, to_username)
            .await?;
        Ok(())
    }

    /// Accept or reject a pending request. On accept the pair's private
    /// room is returned.
    pub async fn respond_friend_request(
        &self,
        requester_id: &UserId,
        accept: bool,
    ) -> Result<Option<Room>, SessionError> {
        let principal = self.current_principal()?;
        let Some(user_id) = principal.user_id() else {
            return Err(SessionError::NotAuthenticated);
        };
        Ok(self
            .identity
            .resolve_friend_request(user_id, requester_id, accept)
            .await?)
    }

    // ------------------------------------------------------------------
    // Voice and audit surfaces
    // ------------------------------------------------------------------

    /// Record that this session opened the room's voice channel. The
    /// media plane itself lives with the UI collaborator.
    pub async fn open_voice_channel(&self) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;
        self.audit
            .record(
                LogLevel::Info,
                "voice_open",
                format!("{} opened voice in {room_id}", principal.display_name()),
            )
            .await;
        Ok(())
    }

    pub async fn close_voice_channel(&self) -> Result<(), SessionError> {
        let (principal, room_id) = self.require_in_room()?;
        self.audit
            .record(
                LogLevel::Info,
                "voice_close",
                format!("{} closed voice in {room_id}", principal.display_name()),
            )
            .await;
        Ok(())
    }

    /// Publish the most recent audit records to the event stream.
    pub async fn refresh_audit(&self) -> Result<(), SessionError> {
        let entries = self.audit.recent(AUDIT_WINDOW).await?;
        self.publish(SessionEvent::Audit(entries));
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_state().phase.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: SessionEvent) {
        // A dropped receiver means the UI went away; nothing to do.
        let _ = self.events.send(event);
    }

    fn current_principal(&self) -> Result<Principal, SessionError> {
        self.lock_state()
            .principal
            .clone()
            .ok_or(SessionError::NotAuthenticated)
    }

    fn require_in_room(&self) -> Result<(Principal, RoomId), SessionError> {
        let state = self.lock_state();
        let SessionPhase::InRoom(room_id) = state.phase.clone() else {
            return Err(SessionError::NotInRoom);
        };
        let principal = state
            .principal
            .clone()
            .ok_or(SessionError::NotAuthenticated)?;
        Ok((principal, room_id))
    }

    /// Mute is enforced locally against the room subscription's latest
    /// snapshot; no store round-trip happens for a rejected send.
    fn ensure_can_send(&self, principal: &Principal) -> Result<(), SessionError> {
        if principal.is_admin() {
            return Ok(());
        }
        let Some(user_id) = principal.user_id() else {
            return Ok(());
        };

        let state = self.lock_state();
        if let Some(room) = &state.current_room {
            if room.is_muted(user_id) {
                return Err(SessionError::Muted);
            }
        }
        Ok(())
    }

    async fn spawn_profile_watch(self: &Arc<Self>, user_id: UserId) -> Result<(), SessionError> {
        let mut sub = self
            .store
            .subscribe(WatchTarget::Doc {
                collection: USERS.to_string(),
                id: user_id.0.clone(),
            })
            .await
            .map_err(ServiceError::Store)?;

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = sub.next().await {
                let Some(doc) = snapshot.docs.into_iter().next() else {
                    continue;
                };
                match from_document::<User>(doc) {
                    Ok(user) => {
                        {
                            let mut state = session.lock_state();
                            if state.principal.is_some() {
                                // Externally-driven role or friend changes
                                // take effect immediately.
                                state.principal = Some(Principal::Registered(user.clone()));
                            }
                        }
                        session.publish(SessionEvent::Profile(user));
                    }
                    Err(e) => warn!(error = %e, "undecodable user snapshot"),
                }
            }
        });

        self.lock_state().profile_task = Some(handle);
        Ok(())
    }

    async fn spawn_rooms_watch(self: &Arc<Self>, user_id: UserId) -> Result<(), SessionError> {
        let mut sub = self
            .store
            .subscribe(WatchTarget::Query {
                collection: ROOMS.to_string(),
                filter: Filter::ArrayContains("participants".into(), json!(user_id)),
            })
            .await
            .map_err(ServiceError::Store)?;

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = sub.next().await {
                let mut rooms: Vec<Room> = snapshot
                    .docs
                    .into_iter()
                    .filter_map(|doc| from_document::<Room>(doc).ok())
                    .filter(|room| !room.deleted)
                    .collect();
                rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                session.publish(SessionEvent::Rooms(rooms));
            }
        });

        self.lock_state().rooms_task = Some(handle);
        Ok(())
    }

    async fn spawn_room_watch(
        self: &Arc<Self>,
        room_id: RoomId,
        principal: Principal,
    ) -> Result<(), SessionError> {
        let mut sub = self
            .store
            .subscribe(WatchTarget::Doc {
                collection: ROOMS.to_string(),
                id: room_id.0.clone(),
            })
            .await
            .map_err(ServiceError::Store)?;

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = sub.next().await {
                let room = snapshot
                    .docs
                    .into_iter()
                    .next()
                    .and_then(|doc| from_document::<Room>(doc).ok());

                match eviction_verdict(room.as_ref(), &principal) {
                    Some(reason) => {
                        session.force_exit_room(&room_id, reason);
                        break;
                    }
                    None => {
                        if let Some(room) = room {
                            session.lock_state().current_room = Some(room);
                        }
                    }
                }
            }
        });

        self.lock_state().room_doc_task = Some(handle);
        Ok(())
    }

    async fn spawn_feed(
        self: &Arc<Self>,
        room_id: RoomId,
        principal: Principal,
    ) -> Result<(), SessionError> {
        let mut feed = self.messages.watch(&room_id).await?;
        let reader = principal.user_id().cloned();
        let reader_name = principal.display_name().to_string();

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(messages) = feed.next().await {
                let views: Vec<ChatView> = messages
                    .iter()
                    .cloned()
                    .map(|m| ChatView::from_message(m, &session.envelope))
                    .collect();
                session.publish(SessionEvent::Messages(views));

                // Viewing acknowledges: patch receipts for what was just
                // rendered. Idempotent, so the snapshot this write causes
                // converges instead of looping.
                if let Some(reader) = &reader {
                    if let Err(e) = session
                        .messages
                        .mark_read(&room_id, reader, &reader_name, &messages)
                        .await
                    {
                        warn!(error = %e, "read receipt batch failed");
                    }
                }
            }
        });

        self.lock_state().room_feed_task = Some(handle);
        Ok(())
    }

    fn spawn_assistant(self: &Arc<Self>, room_id: RoomId, prompt: String) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match &session.generator {
                Some(generator) => generator.generate(&prompt, None).await,
                None => Err(GenerationError::Unavailable(
                    "no assistant configured".into(),
                )),
            };

            let message = match outcome {
                Ok(reply) => match session.envelope.seal(&reply) {
                    Ok(sealed) => Message::assistant(sealed, true),
                    Err(e) => {
                        warn!(error = %e, "could not seal assistant reply");
                        return;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "assistant call failed");
                    session
                        .audit
                        .record(LogLevel::Warning, "assistant_error", e.to_string())
                        .await;
                    match session.envelope.seal(&format!("Assistant error: {e}")) {
                        Ok(sealed) => Message::system(sealed, true),
                        Err(_) => return,
                    }
                }
            };

            if let Err(e) = session.messages.append(&room_id, &message).await {
                warn!(error = %e, "could not append assistant message");
            }
        });
    }

    /// Server-driven exit: the room subscription saw this session banned,
    /// kicked or orphaned by deletion. All three take the same path out.
    fn force_exit_room(&self, room_id: &RoomId, reason: EvictionReason) {
        {
            let mut state = self.lock_state();
            if state.phase != SessionPhase::InRoom(room_id.clone()) {
                return;
            }
            state.phase = SessionPhase::Authenticated;
            state.current_room = None;
            if let Some(handle) = state.room_feed_task.take() {
                handle.abort();
            }
            // The room watch task is the caller; it breaks on its own.
            state.room_doc_task.take();
        }

        warn!(room = %room_id, ?reason, "evicted from room");
        self.publish(SessionEvent::Evicted {
            room_id: room_id.clone(),
            reason,
        });

        let audit = self.audit.clone();
        let detail = format!("evicted from {room_id}: {}", reason.notice());
        tokio::spawn(async move {
            audit.record(LogLevel::Warning, "eviction", detail).await;
        });
    }
}

/// Whether a room snapshot means this principal no longer belongs there.
fn eviction_verdict(room: Option<&Room>, principal: &Principal) -> Option<EvictionReason> {
    let Some(room) = room else {
        return Some(EvictionReason::RoomDeleted);
    };
    if room.deleted {
        return Some(EvictionReason::RoomDeleted);
    }

    // The operator is never written into membership documents, so
    // membership changes cannot mean anything for it.
    let user_id = principal.user_id()?;

    if room.is_banned(user_id) {
        return Some(EvictionReason::Banned);
    }
    if !room.is_participant(user_id) {
        return Some(EvictionReason::Kicked);
    }
    None
}

//! User records, credential checks and the friend graph.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use parley_shared::error::{AuthError, FriendError};
use parley_shared::types::{LogLevel, Role, UserId};
use parley_store::{from_document, to_document, Filter, Patch, Store, StoreError};

use crate::audit::AuditLog;
use crate::auth::Authenticator;
use crate::models::{Room, User, USERS};
use crate::rooms::RoomRegistry;
use crate::Result;

/// The identity a session acts as.
///
/// The operator is a synthetic administrative identity checked against
/// configuration. It has no user document, so it is never persisted and
/// never subscribed to; modelling it as its own variant keeps those
/// attempts unrepresentable.
#[derive(Debug, Clone)]
pub enum Principal {
    Registered(User),
    Operator { username: String },
}

impl Principal {
    /// Stable id, absent for the operator.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Principal::Registered(user) => Some(&user.id),
            Principal::Operator { .. } => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Principal::Registered(user) => &user.username,
            Principal::Operator { username } => username,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            Principal::Registered(user) => user.role.is_admin(),
            Principal::Operator { .. } => true,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Principal::Operator { .. })
    }
}

/// The fixed configuration pair the operator authenticates with.
#[derive(Debug, Clone)]
pub struct OperatorCredentials {
    pub username: String,
    pub password: String,
}

/// Owner of [`User`] documents.
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn Store>,
    auth: Arc<dyn Authenticator>,
    rooms: RoomRegistry,
    audit: AuditLog,
    operator: Option<OperatorCredentials>,
}

impl IdentityStore {
    pub fn new(
        store: Arc<dyn Store>,
        auth: Arc<dyn Authenticator>,
        rooms: RoomRegistry,
        audit: AuditLog,
        operator: Option<OperatorCredentials>,
    ) -> Self {
        Self {
            store,
            auth,
            rooms,
            audit,
            operator,
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Register a new user. The username must be unused (exact,
    /// case-sensitive match).
    pub async fn register(&self, username: &str, password: &str) -> Result<User> {
        if find_user_by_username(self.store.as_ref(), username)
            .await?
            .is_some()
        {
            return Err(AuthError::UsernameTaken.into());
        }

        let cred = self.auth.create_account(username, password).await?;
        let user = User {
            id: cred.id,
            username: username.to_string(),
            password_hash: cred.verifier,
            role: Role::User,
            created_at: Utc::now(),
            friends: Vec::new(),
            friend_requests: Vec::new(),
            last_login: None,
            login_history: Vec::new(),
        };

        self.store
            .create(USERS, user.id.as_str(), to_document(&user)?)
            .await?;

        info!(username, id = %user.id, "user registered");
        self.audit
            .record(
                LogLevel::Info,
                "registration",
                format!("user {username} registered"),
            )
            .await;
        Ok(user)
    }

    /// Verify credentials and produce the session principal.
    ///
    /// The operator pair is checked first, by literal match, and never
    /// touches the store.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Principal> {
        if let Some(op) = &self.operator {
            if op.username == username && op.password == password {
                self.audit
                    .record(LogLevel::Info, "login", "operator logged in")
                    .await;
                return Ok(Principal::Operator {
                    username: username.to_string(),
                });
            }
        }

        let Some(user) = find_user_by_username(self.store.as_ref(), username).await? else {
            warn!(username, "login failed: unknown user");
            self.audit
                .record(
                    LogLevel::Warning,
                    "login_failure",
                    format!("unknown user {username}"),
                )
                .await;
            return Err(AuthError::UserNotFound.into());
        };

        if !self
            .auth
            .verify_credentials(&user.password_hash, password)
            .await?
        {
            warn!(username, "login failed: bad credentials");
            self.audit
                .record(
                    LogLevel::Warning,
                    "login_failure",
                    format!("bad credentials for {username}"),
                )
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }

        self.audit
            .record(LogLevel::Info, "login", format!("{username} logged in"))
            .await;
        Ok(Principal::Registered(user))
    }

    /// Stamp a successful login. A no-op for the operator, which has no
    /// record to stamp.
    pub async fn record_login(&self, principal: &Principal) -> Result<()> {
        let Some(id) = principal.user_id() else {
            return Ok(());
        };
        let now = Utc::now();
        self.store
            .update(
                USERS,
                id.as_str(),
                vec![
                    ("last_login".into(), Patch::Set(json!(now))),
                    ("login_history".into(), Patch::Union(vec![json!(now)])),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        let doc = self.store.get(USERS, id.as_str()).await.map_err(|e| match e {
            StoreError::NotFound => AuthError::UserNotFound.into(),
            other => crate::ServiceError::Store(other),
        })?;
        Ok(from_document(doc)?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        find_user_by_username(self.store.as_ref(), username).await
    }

    /// Grant the platform-wide administrative role.
    pub async fn promote_to_admin(&self, id: &UserId) -> Result<()> {
        self.store
            .update(
                USERS,
                id.as_str(),
                vec![("role".into(), Patch::Set(json!(Role::Admin)))],
            )
            .await?;
        self.audit
            .record(LogLevel::Alert, "role_change", format!("{id} promoted to admin"))
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Friend graph
    // ------------------------------------------------------------------

    /// Record a pending friend request on the target's document.
    pub async fn send_friend_request(&self, from: &UserId, to_username: &str) -> Result<()> {
        let Some(target) = find_user_by_username(self.store.as_ref(), to_username).await? else {
            return Err(FriendError::UserNotFound.into());
        };

        if target.id == *from {
            return Err(FriendError::SelfRequest.into());
        }
        if target.is_friend(from) {
            return Err(FriendError::AlreadyFriends.into());
        }
        if target.has_pending_request_from(from) {
            return Err(FriendError::RequestDuplicate.into());
        }

        self.store
            .update(
                USERS,
                target.id.as_str(),
                vec![(
                    "friend_requests".into(),
                    Patch::Union(vec![json!(from)]),
                )],
            )
            .await?;

        self.audit
            .record(
                LogLevel::Info,
                "friend_request",
                format!("{from} -> {to_username}"),
            )
            .await;
        Ok(())
    }

    /// Resolve a pending request.
    ///
    /// The request is removed first in every case, so a stale or repeated
    /// resolution is harmless. On accept the friendship is added
    /// symmetrically and the pair's deterministic private room is created
    /// if absent; concurrent accepts race safely on that create.
    pub async fn resolve_friend_request(
        &self,
        user_id: &UserId,
        requester_id: &UserId,
        accept: bool,
    ) -> Result<Option<Room>> {
        let user = self.get_user(user_id).await?;

        self.store
            .update(
                USERS,
                user_id.as_str(),
                vec![(
                    "friend_requests".into(),
                    Patch::Remove(vec![json!(requester_id)]),
                )],
            )
            .await?;

        if !accept {
            self.audit
                .record(
                    LogLevel::Info,
                    "friend_reject",
                    format!("{user_id} rejected {requester_id}"),
                )
                .await;
            return Ok(None);
        }

        // A self-entry can only come from corrupted data; drop it quietly.
        if user_id == requester_id {
            return Ok(None);
        }

        let requester = self.get_user(requester_id).await.map_err(|e| match e {
            crate::ServiceError::Auth(AuthError::UserNotFound) => FriendError::UserNotFound.into(),
            other => other,
        })?;

        self.store
            .update(
                USERS,
                user_id.as_str(),
                vec![("friends".into(), Patch::Union(vec![json!(requester_id)]))],
            )
            .await?;
        self.store
            .update(
                USERS,
                requester_id.as_str(),
                vec![("friends".into(), Patch::Union(vec![json!(user_id)]))],
            )
            .await?;

        let room = self.rooms.ensure_private(&user, &requester).await?;

        info!(user = %user_id, requester = %requester_id, room = %room.id, "friend request accepted");
        self.audit
            .record(
                LogLevel::Info,
                "friend_accept",
                format!("{user_id} accepted {requester_id}"),
            )
            .await;
        Ok(Some(room))
    }
}

/// Exact, case-sensitive username lookup.
///
/// Shared with [`RoomRegistry`], which resolves moderation targets by
/// username but must not own user records.
pub(crate) async fn find_user_by_username(
    store: &dyn Store,
    username: &str,
) -> Result<Option<User>> {
    let docs = store
        .query(USERS, Filter::Eq("username".into(), json!(username)))
        .await?;

    Ok(docs.into_iter().next().and_then(|doc| from_document(doc).ok()))
}

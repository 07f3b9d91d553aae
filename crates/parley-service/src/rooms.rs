//! Room lifecycle, membership and moderation.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tracing::info;

use parley_shared::command::ModAction;
use parley_shared::constants::ROOM_CODE_DIGITS;
use parley_shared::error::RoomError;
use parley_shared::types::{LogLevel, RoomId, RoomKind, UserId};
use parley_store::{from_document, to_document, Filter, Patch, Store};

use crate::audit::AuditLog;
use crate::identity::{find_user_by_username, Principal};
use crate::models::{Room, User, ROOMS};
use crate::Result;

/// Attempts at minting an unused room code before giving up.
const CODE_ATTEMPTS: usize = 8;

/// Owner of [`Room`] documents: the only writer of membership and
/// moderation fields.
#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn Store>,
    audit: AuditLog,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn Store>, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a group room with a fresh share code. The creator is the
    /// sole initial participant.
    pub async fn create_group(&self, name: &str, creator_id: &UserId) -> Result<Room> {
        for _ in 0..CODE_ATTEMPTS {
            let code = mint_room_code();
            let room = Room {
                id: RoomId(code),
                name: name.to_string(),
                kind: RoomKind::Group,
                creator_id: creator_id.clone(),
                created_at: Utc::now(),
                participants: vec![creator_id.clone()],
                banned_users: Vec::new(),
                muted_users: Vec::new(),
                deleted: false,
            };

            match self
                .store
                .create(ROOMS, room.id.as_str(), to_document(&room)?)
                .await
            {
                Ok(()) => {
                    info!(room = %room.id, name, "group room created");
                    self.audit
                        .record(
                            LogLevel::Info,
                            "room_create",
                            format!("room {} ({}) created by {}", room.id, name, creator_id),
                        )
                        .await;
                    return Ok(room);
                }
                Err(parley_store::StoreError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(parley_store::StoreError::Unavailable(
            "could not mint an unused room code".into(),
        )
        .into())
    }

    /// Create the deterministic private room for two friends if it does
    /// not exist yet. Safe to race: losers of the create adopt the winner.
    pub async fn ensure_private(&self, a: &User, b: &User) -> Result<Room> {
        let id = RoomId::private_pair(&a.id, &b.id);
        let room = Room {
            id: id.clone(),
            name: format!("{} & {}", a.username, b.username),
            kind: RoomKind::Private,
            creator_id: a.id.clone(),
            created_at: Utc::now(),
            participants: vec![a.id.clone(), b.id.clone()],
            banned_users: Vec::new(),
            muted_users: Vec::new(),
            deleted: false,
        };

        match self
            .store
            .create(ROOMS, id.as_str(), to_document(&room)?)
            .await
        {
            Ok(()) => {
                self.audit
                    .record(
                        LogLevel::Info,
                        "room_create",
                        format!("private room {id} created"),
                    )
                    .await;
                Ok(room)
            }
            Err(parley_store::StoreError::Conflict) => self.get(&id).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a live room. Tombstoned rooms read as absent.
    pub async fn get(&self, room_id: &RoomId) -> Result<Room> {
        let doc = self
            .store
            .get(ROOMS, room_id.as_str())
            .await
            .map_err(|e| match e {
                parley_store::StoreError::NotFound => RoomError::NotFound.into(),
                other => crate::ServiceError::Store(other),
            })?;

        let room: Room = from_document(doc)?;
        if room.deleted {
            return Err(RoomError::NotFound.into());
        }
        Ok(room)
    }

    /// Rooms the user currently participates in, newest first.
    pub async fn rooms_for_user(&self, user_id: &UserId) -> Result<Vec<Room>> {
        let docs = self
            .store
            .query(
                ROOMS,
                Filter::ArrayContains("participants".into(), json!(user_id)),
            )
            .await?;

        let mut rooms: Vec<Room> = docs
            .into_iter()
            .filter_map(|doc| from_document::<Room>(doc).ok())
            .filter(|room| !room.deleted)
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Join a room.
    ///
    /// Administrative principals bypass every access check. Everyone else
    /// is refused when banned, and refused from private rooms they are not
    /// already in: private membership is granted by the friend-accept
    /// flow, never self-joined. Joining twice is a no-op.
    pub async fn join(&self, room_id: &RoomId, principal: &Principal) -> Result<Room> {
        let room = self.get(room_id).await?;

        if principal.is_admin() {
            if let Some(id) = principal.user_id() {
                self.add_participant(room_id, id).await?;
            }
            self.audit
                .record(
                    LogLevel::Info,
                    "room_join",
                    format!("{} joined {room_id} (admin)", principal.display_name()),
                )
                .await;
            return self.get(room_id).await;
        }

        let Some(user_id) = principal.user_id() else {
            return Err(RoomError::AccessDenied.into());
        };

        if room.is_banned(user_id) {
            return Err(RoomError::Banned.into());
        }
        if room.kind == RoomKind::Private && !room.is_participant(user_id) {
            return Err(RoomError::AccessDenied.into());
        }

        if !room.is_participant(user_id) {
            self.add_participant(room_id, user_id).await?;
        }

        self.audit
            .record(
                LogLevel::Info,
                "room_join",
                format!("{} joined {room_id}", principal.display_name()),
            )
            .await;
        self.get(room_id).await
    }

    /// Voluntarily leave a room.
    pub async fn leave(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
        self.store
            .update(
                ROOMS,
                room_id.as_str(),
                vec![(
                    "participants".into(),
                    Patch::Remove(vec![json!(user_id)]),
                )],
            )
            .await?;

        self.audit
            .record(
                LogLevel::Info,
                "room_leave",
                format!("{user_id} left {room_id}"),
            )
            .await;
        Ok(())
    }

    /// Tombstone a room. Only its creator or an administrator may.
    pub async fn delete(&self, room_id: &RoomId, acting: &Principal) -> Result<()> {
        let room = self.get(room_id).await?;

        let allowed =
            acting.is_admin() || acting.user_id() == Some(&room.creator_id);
        if !allowed {
            return Err(RoomError::NotAuthorized.into());
        }

        self.store
            .update(
                ROOMS,
                room_id.as_str(),
                vec![("deleted".into(), Patch::Set(json!(true)))],
            )
            .await?;

        self.audit
            .record(
                LogLevel::Warning,
                "room_delete",
                format!("room {room_id} deleted by {}", acting.display_name()),
            )
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    /// Apply a moderation action to a user, addressed by username.
    ///
    /// The acting principal must hold an administrative role; the check
    /// lives here, not only in whichever surface offered the command.
    /// Every action is idempotent. Banning removes the target from
    /// `participants` in the same write that adds them to `banned_users`,
    /// which is what keeps the two sets disjoint.
    pub async fn moderate(
        &self,
        room_id: &RoomId,
        acting: &Principal,
        action: ModAction,
        target_username: &str,
    ) -> Result<String> {
        if !acting.is_admin() {
            return Err(RoomError::NotAuthorized.into());
        }

        // Room must exist before we resolve the target.
        self.get(room_id).await?;

        let target = find_user_by_username(self.store.as_ref(), target_username)
            .await?
            .ok_or(RoomError::UserNotFound)?;

        let patches = match action {
            ModAction::Kick => vec![(
                "participants".to_string(),
                Patch::Remove(vec![json!(target.id)]),
            )],
            ModAction::Ban => vec![
                (
                    "participants".to_string(),
                    Patch::Remove(vec![json!(target.id)]),
                ),
                (
                    "banned_users".to_string(),
                    Patch::Union(vec![json!(target.id)]),
                ),
            ],
            ModAction::Mute => vec![(
                "muted_users".to_string(),
                Patch::Union(vec![json!(target.id)]),
            )],
        };

        self.store.update(ROOMS, room_id.as_str(), patches).await?;

        let confirmation = format!("User {} {}.", target_username, action.past_tense());
        info!(room = %room_id, target = target_username, action = action.as_str(), "moderation applied");
        self.audit
            .record(
                LogLevel::Warning,
                "moderation",
                format!(
                    "{} {} {} in {room_id}",
                    acting.display_name(),
                    action.past_tense(),
                    target_username
                ),
            )
            .await;

        Ok(confirmation)
    }

    async fn add_participant(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
        self.store
            .update(
                ROOMS,
                room_id.as_str(),
                vec![(
                    "participants".into(),
                    Patch::Union(vec![json!(user_id)]),
                )],
            )
            .await?;
        Ok(())
    }
}

/// A numeric share code, e.g. `4301877`.
fn mint_room_code() -> String {
    let lo = 10u64.pow(ROOM_CODE_DIGITS - 1);
    let hi = 10u64.pow(ROOM_CODE_DIGITS);
    rand::thread_rng().gen_range(lo..hi).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ArgonAuthenticator;
    use crate::identity::IdentityStore;
    use parley_store::MemoryStore;

    async fn fixture() -> (RoomRegistry, IdentityStore) {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store.clone());
        let rooms = RoomRegistry::new(store.clone(), audit.clone());
        let identity = IdentityStore::new(
            store,
            Arc::new(ArgonAuthenticator::new()),
            rooms.clone(),
            audit,
            None,
        );
        (rooms, identity)
    }

    async fn admin_principal(identity: &IdentityStore, name: &str) -> Principal {
        let user = identity.register(name, "pw").await.unwrap();
        identity.promote_to_admin(&user.id).await.unwrap();
        Principal::Registered(identity.get_user(&user.id).await.unwrap())
    }

    #[test]
    fn room_codes_are_seven_digits() {
        for _ in 0..32 {
            let code = mint_room_code();
            assert_eq!(code.len(), 7);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn creator_is_sole_initial_participant() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();

        let room = rooms.create_group("general", &alice.id).await.unwrap();
        assert_eq!(room.participants, vec![alice.id]);
        assert_eq!(room.kind, RoomKind::Group);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        let bob = identity.register("bob", "pw").await.unwrap();
        let room = rooms.create_group("general", &alice.id).await.unwrap();

        let principal = Principal::Registered(bob.clone());
        rooms.join(&room.id, &principal).await.unwrap();
        let after = rooms.join(&room.id, &principal).await.unwrap();

        assert_eq!(
            after.participants.iter().filter(|id| **id == bob.id).count(),
            1
        );
    }

    #[tokio::test]
    async fn banned_user_cannot_join() {
        let (rooms, identity) = fixture().await;
        let admin = admin_principal(&identity, "root").await;
        let carol = identity.register("carol", "pw").await.unwrap();

        let admin_id = admin.user_id().unwrap().clone();
        let room = rooms.create_group("general", &admin_id).await.unwrap();
        rooms
            .join(&room.id, &Principal::Registered(carol.clone()))
            .await
            .unwrap();

        let confirmation = rooms
            .moderate(&room.id, &admin, ModAction::Ban, "carol")
            .await
            .unwrap();
        assert_eq!(confirmation, "User carol banned.");

        let after = rooms.get(&room.id).await.unwrap();
        assert!(!after.is_participant(&carol.id));
        assert!(after.is_banned(&carol.id));

        assert!(matches!(
            rooms.join(&room.id, &Principal::Registered(carol)).await,
            Err(crate::ServiceError::Room(RoomError::Banned))
        ));
    }

    #[tokio::test]
    async fn ban_is_idempotent() {
        let (rooms, identity) = fixture().await;
        let admin = admin_principal(&identity, "root").await;
        identity.register("carol", "pw").await.unwrap();

        let admin_id = admin.user_id().unwrap().clone();
        let room = rooms.create_group("general", &admin_id).await.unwrap();

        rooms
            .moderate(&room.id, &admin, ModAction::Ban, "carol")
            .await
            .unwrap();
        rooms
            .moderate(&room.id, &admin, ModAction::Ban, "carol")
            .await
            .unwrap();

        let after = rooms.get(&room.id).await.unwrap();
        assert_eq!(after.banned_users.len(), 1);
    }

    #[tokio::test]
    async fn mute_keeps_participation() {
        let (rooms, identity) = fixture().await;
        let admin = admin_principal(&identity, "root").await;
        let dave = identity.register("dave", "pw").await.unwrap();

        let admin_id = admin.user_id().unwrap().clone();
        let room = rooms.create_group("general", &admin_id).await.unwrap();
        rooms
            .join(&room.id, &Principal::Registered(dave.clone()))
            .await
            .unwrap();

        rooms
            .moderate(&room.id, &admin, ModAction::Mute, "dave")
            .await
            .unwrap();

        let after = rooms.get(&room.id).await.unwrap();
        assert!(after.is_participant(&dave.id));
        assert!(after.is_muted(&dave.id));
    }

    #[tokio::test]
    async fn kick_removes_participation_only() {
        let (rooms, identity) = fixture().await;
        let admin = admin_principal(&identity, "root").await;
        let erin = identity.register("erin", "pw").await.unwrap();

        let admin_id = admin.user_id().unwrap().clone();
        let room = rooms.create_group("general", &admin_id).await.unwrap();
        rooms
            .join(&room.id, &Principal::Registered(erin.clone()))
            .await
            .unwrap();

        rooms
            .moderate(&room.id, &admin, ModAction::Kick, "erin")
            .await
            .unwrap();

        let after = rooms.get(&room.id).await.unwrap();
        assert!(!after.is_participant(&erin.id));
        assert!(!after.is_banned(&erin.id));

        // A kicked user may come back.
        assert!(rooms
            .join(&room.id, &Principal::Registered(erin))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn moderation_requires_admin_role() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        identity.register("bob", "pw").await.unwrap();

        let room = rooms.create_group("general", &alice.id).await.unwrap();

        assert!(matches!(
            rooms
                .moderate(
                    &room.id,
                    &Principal::Registered(alice),
                    ModAction::Kick,
                    "bob"
                )
                .await,
            Err(crate::ServiceError::Room(RoomError::NotAuthorized))
        ));
    }

    #[tokio::test]
    async fn moderation_unknown_target() {
        let (rooms, identity) = fixture().await;
        let admin = admin_principal(&identity, "root").await;
        let admin_id = admin.user_id().unwrap().clone();
        let room = rooms.create_group("general", &admin_id).await.unwrap();

        assert!(matches!(
            rooms
                .moderate(&room.id, &admin, ModAction::Ban, "ghost")
                .await,
            Err(crate::ServiceError::Room(RoomError::UserNotFound))
        ));
    }

    #[tokio::test]
    async fn operator_bypasses_access_checks() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        let bob = identity.register("bob", "pw").await.unwrap();
        let private = rooms.ensure_private(&alice, &bob).await.unwrap();

        let operator = Principal::Operator {
            username: "root".into(),
        };
        // Not a participant, yet allowed in.
        assert!(rooms.join(&private.id, &operator).await.is_ok());
    }

    #[tokio::test]
    async fn private_room_refuses_outsiders() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        let bob = identity.register("bob", "pw").await.unwrap();
        let carol = identity.register("carol", "pw").await.unwrap();

        let private = rooms.ensure_private(&alice, &bob).await.unwrap();

        assert!(matches!(
            rooms
                .join(&private.id, &Principal::Registered(carol))
                .await,
            Err(crate::ServiceError::Room(RoomError::AccessDenied))
        ));
    }

    #[tokio::test]
    async fn deleted_room_reads_as_absent() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        let room = rooms.create_group("general", &alice.id).await.unwrap();

        rooms
            .delete(&room.id, &Principal::Registered(alice.clone()))
            .await
            .unwrap();

        assert!(matches!(
            rooms.get(&room.id).await,
            Err(crate::ServiceError::Room(RoomError::NotFound))
        ));
        assert!(rooms.rooms_for_user(&alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_creator_or_admin() {
        let (rooms, identity) = fixture().await;
        let alice = identity.register("alice", "pw").await.unwrap();
        let bob = identity.register("bob", "pw").await.unwrap();
        let room = rooms.create_group("general", &alice.id).await.unwrap();

        assert!(matches!(
            rooms.delete(&room.id, &Principal::Registered(bob)).await,
            Err(crate::ServiceError::Room(RoomError::NotAuthorized))
        ));
    }
}

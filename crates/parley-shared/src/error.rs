use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Expected outcomes of registration and credential checks. These are
/// rendered to the user, never treated as faults.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Username is already taken")]
    UsernameTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Friend-request lifecycle failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FriendError {
    #[error("User not found")]
    UserNotFound,

    #[error("Cannot send a friend request to yourself")]
    SelfRequest,

    #[error("Already friends")]
    AlreadyFriends,

    #[error("Friend request already pending")]
    RequestDuplicate,
}

/// Room access and moderation failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("You are banned from this room")]
    Banned,

    #[error("Access denied")]
    AccessDenied,

    #[error("Target user not found")]
    UserNotFound,

    #[error("Moderation requires an administrative role")]
    NotAuthorized,
}

use thiserror::Error;

use parley_shared::error::{AuthError, CryptoError, FriendError, RoomError};
use parley_store::StoreError;

/// Errors surfaced by the domain services.
///
/// Validation outcomes (`Auth`, `Friend`, `Room`) are expected user-facing
/// results; `Store` failures are infrastructure and rendered as retryable.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Friend(#[from] FriendError),

    #[error("{0}")]
    Room(#[from] RoomError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The backing store cannot perform this operation; reported rather
    /// than pretending it succeeded.
    #[error("Operation not supported by the backing store: {0}")]
    Unsupported(&'static str),
}

use thiserror::Error;

use parley_shared::error::CryptoError;
use parley_service::ServiceError;

/// Errors surfaced to the UI collaborator by the session orchestrator.
///
/// `Connectivity` is infrastructure and retryable; everything else is a
/// validation outcome of the user's own input or session state.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The store or identity provider did not answer in time.
    #[error("Connection timed out, try again")]
    Connectivity,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Not currently in a room")]
    NotInRoom,

    #[error("You are muted in this room")]
    Muted,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

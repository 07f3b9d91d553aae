//! # parley-service
//!
//! The persistent-domain services of the messaging core, written against
//! the abstract [`parley_store::Store`] contract:
//!
//! - [`IdentityStore`] owns user records, credential checks and the friend
//!   graph.
//! - [`RoomRegistry`] owns room lifecycle, membership and moderation.
//! - [`MessageLog`] owns the per-room message sequence and read receipts.
//! - [`AuditLog`] is the write-only system event record.
//!
//! Each service is the sole writer of the records it owns; reads cross
//! those boundaries freely.

pub mod audit;
pub mod auth;
pub mod identity;
pub mod messages;
pub mod models;
pub mod rooms;

mod error;

pub use audit::AuditLog;
pub use auth::{ArgonAuthenticator, Authenticator, ProviderCredential};
pub use error::ServiceError;
pub use identity::{IdentityStore, Principal};
pub use messages::{MessageFeed, MessageLog};
pub use models::{LogEntry, Message, Room, User};
pub use rooms::RoomRegistry;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ServiceError>;

//! # parley-store
//!
//! The abstract document store the messaging core is written against, plus
//! an in-memory implementation used by tests and local development.
//!
//! The contract mirrors what hosted document databases actually provide:
//! document CRUD, field-level patches with atomic set-union/set-remove
//! semantics, equality and array-contains queries, change subscriptions
//! that deliver a snapshot on registration and on every subsequent change,
//! and bounded batch updates that commit or fail as a whole.

pub mod document;
pub mod memory;
pub mod store;

mod error;

pub use document::{from_document, to_document, Document};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{BatchOp, Filter, Patch, Snapshot, Store, Subscription, WatchTarget};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

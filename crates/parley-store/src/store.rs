//! The abstract [`Store`] contract.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{Document, Result};

/// A single field mutation applied server-side.
///
/// `Union` and `Remove` carry the atomic set semantics the core relies on:
/// concurrent patches against the same array field compose without lost
/// updates, so a client must never read-modify-write an array.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Replace the field with the given value.
    Set(Value),
    /// Append the given elements to an array field, skipping elements
    /// already present.
    Union(Vec<Value>),
    /// Remove the given elements from an array field.
    Remove(Vec<Value>),
}

/// Query predicate. Equality and array-contains are the only shapes the
/// backing providers index.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the collection.
    All,
    /// `field == value`.
    Eq(String, Value),
    /// Array field contains the value.
    ArrayContains(String, Value),
}

impl Filter {
    /// Whether a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::ArrayContains(field, value) => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}

/// What a subscription observes: a single document or a query's result set.
#[derive(Debug, Clone)]
pub enum WatchTarget {
    Doc { collection: String, id: String },
    Query { collection: String, filter: Filter },
}

impl WatchTarget {
    pub fn collection(&self) -> &str {
        match self {
            WatchTarget::Doc { collection, .. } => collection,
            WatchTarget::Query { collection, .. } => collection,
        }
    }
}

/// The state a subscription delivers: every matching document at the time
/// of the change. For a document target the vector holds zero or one entry.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub docs: Vec<Document>,
}

/// One document's patches inside a batch.
#[derive(Debug, Clone)]
pub struct BatchOp {
    pub collection: String,
    pub id: String,
    pub patches: Vec<(String, Patch)>,
}

/// Live registration handle returned by [`Store::subscribe`].
///
/// The registration is released exactly once: by calling
/// [`Subscription::unsubscribe`], or on drop if the caller never did.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Snapshot>,
        cancel: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            rx,
            cancel: Some(cancel),
        }
    }

    /// Wait for the next snapshot. Returns `None` once the store side has
    /// closed the stream.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Release the registration.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// The persistence boundary the messaging core requires.
///
/// Implementations must apply each `update` atomically per document and
/// honour set semantics for [`Patch::Union`] / [`Patch::Remove`] without
/// client-side read-modify-write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one document. `Err(NotFound)` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Document>;

    /// Create or fully replace one document.
    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Create a document only if it does not already exist.
    /// `Err(Conflict)` when present; this is the conditional primitive
    /// behind race-tolerant create-if-absent flows.
    async fn create(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Apply field patches to one document atomically.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patches: Vec<(String, Patch)>,
    ) -> Result<()>;

    /// Fetch every document matching the filter.
    async fn query(&self, collection: &str, filter: Filter) -> Result<Vec<Document>>;

    /// Register a live subscription. The current matching state is
    /// delivered immediately, then again after every change, until the
    /// returned handle is released.
    async fn subscribe(&self, target: WatchTarget) -> Result<Subscription>;

    /// Apply patches across multiple documents, committed or failed as a
    /// whole. `Err(BatchTooLarge)` when `ops` exceeds `cap`.
    async fn batch_update(&self, ops: Vec<BatchOp>, cap: usize) -> Result<()>;
}

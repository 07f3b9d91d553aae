//! In-memory [`Store`] implementation.
//!
//! Backs every test and local development run. Mutations and watcher
//! notification happen under one lock, so subscribers observe each commit
//! exactly once and in order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::store::{BatchOp, Filter, Patch, Snapshot, Store, Subscription, WatchTarget};
use crate::{Document, Result, StoreError};

/// A process-local document store with live change subscriptions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, BTreeMap<String, Document>>>,
    watchers: Mutex<HashMap<u64, Watcher>>,
    next_watcher_id: AtomicU64,
}

struct Watcher {
    target: WatchTarget,
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

type Collections = HashMap<String, BTreeMap<String, Document>>;

impl Inner {
    fn lock_collections(&self) -> Result<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn lock_watchers(&self) -> Result<MutexGuard<'_, HashMap<u64, Watcher>>> {
        self.watchers
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Snapshot of the current state a watch target observes.
    /// Caller must hold the collections lock.
    fn snapshot_locked(
        collections: &HashMap<String, BTreeMap<String, Document>>,
        target: &WatchTarget,
    ) -> Snapshot {
        let docs = match target {
            WatchTarget::Doc { collection, id } => collections
                .get(collection)
                .and_then(|coll| coll.get(id))
                .cloned()
                .into_iter()
                .collect(),
            WatchTarget::Query { collection, filter } => collections
                .get(collection)
                .map(|coll| {
                    coll.values()
                        .filter(|doc| filter.matches(doc))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        };
        Snapshot { docs }
    }

    /// Push fresh snapshots to every watcher observing `collection`.
    /// Watchers whose receiver has gone away are pruned here.
    fn notify(&self, collection: &str) {
        let Ok(collections) = self.collections.lock() else {
            return;
        };
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };

        watchers.retain(|_, watcher| {
            if watcher.target.collection() != collection {
                return true;
            }
            let snapshot = Self::snapshot_locked(&collections, &watcher.target);
            watcher.tx.send(snapshot).is_ok()
        });
    }

    fn remove_watcher(&self, id: u64) {
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.remove(&id);
        }
    }
}

/// Apply one field patch in place.
fn apply_patch(doc: &mut Document, field: &str, patch: &Patch) {
    match patch {
        Patch::Set(value) => {
            doc.insert(field.to_string(), value.clone());
        }
        Patch::Union(values) => {
            let entry = doc
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }
        Patch::Remove(values) => {
            if let Some(Value::Array(items)) = doc.get_mut(field) {
                items.retain(|item| !values.contains(item));
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Document> {
        let collections = self.inner.lock_collections()?;
        collections
            .get(collection)
            .and_then(|coll| coll.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        {
            let mut collections = self.inner.lock_collections()?;
            collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), doc);
        }
        self.inner.notify(collection);
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        {
            let mut collections = self.inner.lock_collections()?;
            let coll = collections.entry(collection.to_string()).or_default();
            if coll.contains_key(id) {
                return Err(StoreError::Conflict);
            }
            coll.insert(id.to_string(), doc);
        }
        self.inner.notify(collection);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patches: Vec<(String, Patch)>,
    ) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }
        {
            let mut collections = self.inner.lock_collections()?;
            let doc = collections
                .get_mut(collection)
                .and_then(|coll| coll.get_mut(id))
                .ok_or(StoreError::NotFound)?;
            for (field, patch) in &patches {
                apply_patch(doc, field, patch);
            }
        }
        self.inner.notify(collection);
        Ok(())
    }

    async fn query(&self, collection: &str, filter: Filter) -> Result<Vec<Document>> {
        let collections = self.inner.lock_collections()?;
        Ok(collections
            .get(collection)
            .map(|coll| {
                coll.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(&self, target: WatchTarget) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_watcher_id.fetch_add(1, Ordering::Relaxed);

        {
            // Register and deliver the initial snapshot under the same
            // lock, so no commit can slip between the two.
            let collections = self.inner.lock_collections()?;
            let mut watchers = self.inner.lock_watchers()?;

            let initial = Inner::snapshot_locked(&collections, &target);
            let _ = tx.send(initial);
            watchers.insert(id, Watcher { target, tx });
        }

        debug!(watcher = id, "subscription registered");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let cancel = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_watcher(id);
            }
        });

        Ok(Subscription::new(rx, cancel))
    }

    async fn batch_update(&self, ops: Vec<BatchOp>, cap: usize) -> Result<()> {
        if ops.len() > cap {
            return Err(StoreError::BatchTooLarge {
                got: ops.len(),
                cap,
            });
        }
        if ops.is_empty() {
            return Ok(());
        }

        let mut touched: Vec<String> = Vec::new();
        {
            let mut collections = self.inner.lock_collections()?;

            // Verify every target exists before mutating anything, so the
            // batch commits or fails as a whole.
            for op in &ops {
                let exists = collections
                    .get(&op.collection)
                    .is_some_and(|coll| coll.contains_key(&op.id));
                if !exists {
                    return Err(StoreError::NotFound);
                }
            }

            for op in &ops {
                let doc = collections
                    .get_mut(&op.collection)
                    .and_then(|coll| coll.get_mut(&op.id))
                    .ok_or(StoreError::NotFound)?;
                for (field, patch) in &op.patches {
                    apply_patch(doc, field, patch);
                }
                if !touched.contains(&op.collection) {
                    touched.push(op.collection.clone());
                }
            }
        }

        for collection in touched {
            self.inner.notify(&collection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .put("users", "u1", doc(json!({"id": "u1", "username": "alice"})))
            .await
            .unwrap();

        let fetched = store.get("users", "u1").await.unwrap();
        assert_eq!(fetched.get("username").unwrap(), "alice");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("users", "nobody").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = MemoryStore::new();
        store
            .create("rooms", "r1", doc(json!({"id": "r1"})))
            .await
            .unwrap();

        assert!(matches!(
            store.create("rooms", "r1", doc(json!({"id": "r1"}))).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn union_skips_present_elements() {
        let store = MemoryStore::new();
        store
            .put("rooms", "r1", doc(json!({"participants": ["a"]})))
            .await
            .unwrap();

        store
            .update(
                "rooms",
                "r1",
                vec![(
                    "participants".into(),
                    Patch::Union(vec![json!("a"), json!("b")]),
                )],
            )
            .await
            .unwrap();

        let fetched = store.get("rooms", "r1").await.unwrap();
        assert_eq!(fetched.get("participants").unwrap(), &json!(["a", "b"]));
    }

    #[tokio::test]
    async fn remove_drops_elements() {
        let store = MemoryStore::new();
        store
            .put("rooms", "r1", doc(json!({"participants": ["a", "b"]})))
            .await
            .unwrap();

        store
            .update(
                "rooms",
                "r1",
                vec![("participants".into(), Patch::Remove(vec![json!("a")]))],
            )
            .await
            .unwrap();

        let fetched = store.get("rooms", "r1").await.unwrap();
        assert_eq!(fetched.get("participants").unwrap(), &json!(["b"]));
    }

    #[tokio::test]
    async fn union_on_missing_field_creates_array() {
        let store = MemoryStore::new();
        store.put("rooms", "r1", doc(json!({}))).await.unwrap();

        store
            .update(
                "rooms",
                "r1",
                vec![("banned".into(), Patch::Union(vec![json!("x")]))],
            )
            .await
            .unwrap();

        let fetched = store.get("rooms", "r1").await.unwrap();
        assert_eq!(fetched.get("banned").unwrap(), &json!(["x"]));
    }

    #[tokio::test]
    async fn query_by_equality() {
        let store = MemoryStore::new();
        store
            .put("users", "u1", doc(json!({"username": "alice"})))
            .await
            .unwrap();
        store
            .put("users", "u2", doc(json!({"username": "bob"})))
            .await
            .unwrap();

        let hits = store
            .query("users", Filter::Eq("username".into(), json!("bob")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("username").unwrap(), "bob");
    }

    #[tokio::test]
    async fn query_by_array_contains() {
        let store = MemoryStore::new();
        store
            .put("rooms", "r1", doc(json!({"participants": ["a", "b"]})))
            .await
            .unwrap();
        store
            .put("rooms", "r2", doc(json!({"participants": ["c"]})))
            .await
            .unwrap();

        let hits = store
            .query(
                "rooms",
                Filter::ArrayContains("participants".into(), json!("a")),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_and_changes() {
        let store = MemoryStore::new();
        store
            .put("users", "u1", doc(json!({"id": "u1", "v": 1})))
            .await
            .unwrap();

        let mut sub = store
            .subscribe(WatchTarget::Doc {
                collection: "users".into(),
                id: "u1".into(),
            })
            .await
            .unwrap();

        let initial = sub.next().await.unwrap();
        assert_eq!(initial.docs.len(), 1);
        assert_eq!(initial.docs[0].get("v").unwrap(), 1);

        store
            .update("users", "u1", vec![("v".into(), Patch::Set(json!(2)))])
            .await
            .unwrap();

        let changed = sub.next().await.unwrap();
        assert_eq!(changed.docs[0].get("v").unwrap(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        store
            .put("users", "u1", doc(json!({"id": "u1"})))
            .await
            .unwrap();

        let sub = store
            .subscribe(WatchTarget::Doc {
                collection: "users".into(),
                id: "u1".into(),
            })
            .await
            .unwrap();
        sub.unsubscribe();

        // The watcher registry is empty again, so this put has nobody to
        // notify and must not panic.
        store
            .put("users", "u1", doc(json!({"id": "u1", "v": 2})))
            .await
            .unwrap();
        assert!(store.inner.watchers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_subscription_tracks_membership() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe(WatchTarget::Query {
                collection: "rooms".into(),
                filter: Filter::ArrayContains("participants".into(), json!("a")),
            })
            .await
            .unwrap();

        assert!(sub.next().await.unwrap().docs.is_empty());

        store
            .put("rooms", "r1", doc(json!({"id": "r1", "participants": ["a"]})))
            .await
            .unwrap();
        assert_eq!(sub.next().await.unwrap().docs.len(), 1);

        store
            .update(
                "rooms",
                "r1",
                vec![("participants".into(), Patch::Remove(vec![json!("a")]))],
            )
            .await
            .unwrap();
        assert!(sub.next().await.unwrap().docs.is_empty());
    }

    #[tokio::test]
    async fn batch_fails_as_a_whole() {
        let store = MemoryStore::new();
        store
            .put("m", "one", doc(json!({"read_by": []})))
            .await
            .unwrap();

        let ops = vec![
            BatchOp {
                collection: "m".into(),
                id: "one".into(),
                patches: vec![("read_by".into(), Patch::Union(vec![json!("u")]))],
            },
            BatchOp {
                collection: "m".into(),
                id: "missing".into(),
                patches: vec![("read_by".into(), Patch::Union(vec![json!("u")]))],
            },
        ];

        assert!(matches!(
            store.batch_update(ops, 10).await,
            Err(StoreError::NotFound)
        ));

        // Nothing was applied.
        let fetched = store.get("m", "one").await.unwrap();
        assert_eq!(fetched.get("read_by").unwrap(), &json!([]));
    }

    #[tokio::test]
    async fn batch_over_cap_is_rejected() {
        let store = MemoryStore::new();
        let ops: Vec<BatchOp> = (0..3)
            .map(|i| BatchOp {
                collection: "m".into(),
                id: format!("{i}"),
                patches: vec![],
            })
            .collect();

        assert!(matches!(
            store.batch_update(ops, 2).await,
            Err(StoreError::BatchTooLarge { got: 3, cap: 2 })
        ));
    }
}

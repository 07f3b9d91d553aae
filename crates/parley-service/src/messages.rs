//! Append-only per-room message log and read-receipt tracking.
//!
//! Messages live in a per-room sub-collection so each read receipt is one
//! atomic set-union patch on one document. Embedding the log in the room
//! document would force whole-array rewrites and lose concurrent updates.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use parley_shared::constants::{MESSAGE_WINDOW, READ_BATCH_CAP};
use parley_shared::types::{Origin, RoomId, UserId};
use parley_store::{from_document, to_document, BatchOp, Filter, Patch, Store, Subscription, WatchTarget};

use crate::models::{room_messages, Message};
use crate::Result;

/// Owner of [`Message`] documents and the only writer of `read_by`.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn Store>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append one immutable message to a room's log.
    pub async fn append(&self, room_id: &RoomId, message: &Message) -> Result<()> {
        self.store
            .create(
                &room_messages(room_id),
                &message.id.to_string(),
                to_document(message)?,
            )
            .await?;
        debug!(room = %room_id, message = %message.id, "message appended");
        Ok(())
    }

    /// The room's messages in delivery order, capped to the most recent
    /// `limit`.
    pub async fn history(&self, room_id: &RoomId, limit: usize) -> Result<Vec<Message>> {
        let docs = self
            .store
            .query(&room_messages(room_id), Filter::All)
            .await?;

        let mut messages: Vec<Message> = docs
            .into_iter()
            .filter_map(|doc| from_document(doc).ok())
            .collect();
        sort_messages(&mut messages);
        cap_to_window(&mut messages, limit);
        Ok(messages)
    }

    /// Acknowledge messages on behalf of a reader.
    ///
    /// Qualifying messages are user-origin, spoken by someone else, and
    /// not yet acknowledged by this reader. At most [`READ_BATCH_CAP`] of
    /// the oldest qualifying messages are patched per invocation; the rest
    /// are left for a later call rather than failing. Re-invocation with
    /// the same arguments changes nothing once `read_by` contains the
    /// reader.
    pub async fn mark_read(
        &self,
        room_id: &RoomId,
        reader_id: &UserId,
        reader_name: &str,
        candidates: &[Message],
    ) -> Result<usize> {
        self.mark_read_capped(room_id, reader_id, reader_name, candidates, READ_BATCH_CAP)
            .await
    }

    pub(crate) async fn mark_read_capped(
        &self,
        room_id: &RoomId,
        reader_id: &UserId,
        reader_name: &str,
        candidates: &[Message],
        cap: usize,
    ) -> Result<usize> {
        let mut qualifying: Vec<&Message> = candidates
            .iter()
            .filter(|m| {
                m.sender == Origin::User
                    && m.sender_name != reader_name
                    && !m.read_by.contains(reader_id)
            })
            .collect();
        qualifying.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        qualifying.truncate(cap);

        if qualifying.is_empty() {
            return Ok(0);
        }

        let collection = room_messages(room_id);
        let ops: Vec<BatchOp> = qualifying
            .iter()
            .map(|m| BatchOp {
                collection: collection.clone(),
                id: m.id.to_string(),
                patches: vec![(
                    "read_by".to_string(),
                    Patch::Union(vec![json!(reader_id)]),
                )],
            })
            .collect();

        let count = ops.len();
        self.store.batch_update(ops, cap).await?;
        debug!(room = %room_id, reader = %reader_id, count, "read receipts recorded");
        Ok(count)
    }

    /// Live subscription to a room's log. Each snapshot carries the most
    /// recent [`MESSAGE_WINDOW`] messages in delivery order.
    pub async fn watch(&self, room_id: &RoomId) -> Result<MessageFeed> {
        let sub = self
            .store
            .subscribe(WatchTarget::Query {
                collection: room_messages(room_id),
                filter: Filter::All,
            })
            .await?;
        Ok(MessageFeed { sub })
    }
}

/// Live message stream for one room.
pub struct MessageFeed {
    sub: Subscription,
}

impl MessageFeed {
    /// Next ordered snapshot; `None` when the stream has closed.
    pub async fn next(&mut self) -> Option<Vec<Message>> {
        let snapshot = self.sub.next().await?;
        let mut messages: Vec<Message> = snapshot
            .docs
            .into_iter()
            .filter_map(|doc| from_document(doc).ok())
            .collect();
        sort_messages(&mut messages);
        cap_to_window(&mut messages, MESSAGE_WINDOW);
        Some(messages)
    }

    /// Release the underlying registration.
    pub fn unsubscribe(self) {
        self.sub.unsubscribe();
    }
}

/// Timestamp ascending; ties stay in id order rather than being
/// re-sorted on each read.
fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.0.cmp(&b.id.0))
    });
}

/// Keep the most recent `window` entries of an ordered log.
fn cap_to_window(messages: &mut Vec<Message>, window: usize) {
    if messages.len() > window {
        let excess = messages.len() - window;
        messages.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use parley_store::MemoryStore;

    fn log() -> MessageLog {
        MessageLog::new(Arc::new(MemoryStore::new()))
    }

    fn at(base_offset_secs: i64, mut message: Message) -> Message {
        message.timestamp = Utc::now() + Duration::seconds(base_offset_secs);
        message
    }

    #[tokio::test]
    async fn history_is_timestamp_ordered() {
        let log = log();
        let room = RoomId("1234567".into());

        let newer = at(10, Message::user_text("bob", "second".into(), false));
        let older = at(0, Message::user_text("alice", "first".into(), false));

        log.append(&room, &newer).await.unwrap();
        log.append(&room, &older).await.unwrap();

        let history = log.history(&room, 50).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
    }

    #[tokio::test]
    async fn history_caps_to_most_recent() {
        let log = log();
        let room = RoomId("1234567".into());

        for i in 0..5 {
            let msg = at(i, Message::user_text("alice", format!("m{i}"), false));
            log.append(&room, &msg).await.unwrap();
        }

        let history = log.history(&room, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "m3");
        assert_eq!(history[1].content, "m4");
    }

    #[tokio::test]
    async fn mark_read_records_other_peoples_messages_only() {
        let log = log();
        let room = RoomId("1234567".into());
        let reader = UserId("bob-id".into());

        let from_alice = at(0, Message::user_text("alice", "hi".into(), false));
        let from_bob = at(1, Message::user_text("bob", "hey".into(), false));
        let from_system = at(2, Message::system("notice".into(), false));

        for m in [&from_alice, &from_bob, &from_system] {
            log.append(&room, m).await.unwrap();
        }

        let history = log.history(&room, 50).await.unwrap();
        let count = log.mark_read(&room, &reader, "bob", &history).await.unwrap();
        assert_eq!(count, 1);

        let after = log.history(&room, 50).await.unwrap();
        let alice_msg = after.iter().find(|m| m.sender_name == "alice").unwrap();
        let bob_msg = after.iter().find(|m| m.sender_name == "bob").unwrap();
        let system_msg = after.iter().find(|m| m.sender == Origin::System).unwrap();

        assert_eq!(alice_msg.read_by, vec![reader.clone()]);
        assert!(bob_msg.read_by.is_empty());
        assert!(system_msg.read_by.is_empty());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let log = log();
        let room = RoomId("1234567".into());
        let reader = UserId("bob-id".into());

        let msg = Message::user_text("alice", "hi".into(), false);
        log.append(&room, &msg).await.unwrap();

        let history = log.history(&room, 50).await.unwrap();
        log.mark_read(&room, &reader, "bob", &history).await.unwrap();

        let after_first = log.history(&room, 50).await.unwrap();
        let count = log
            .mark_read(&room, &reader, "bob", &after_first)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let after_second = log.history(&room, 50).await.unwrap();
        assert_eq!(after_first[0].read_by, after_second[0].read_by);
        assert_eq!(after_second[0].read_by.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_stops_at_the_cap() {
        let log = log();
        let room = RoomId("1234567".into());
        let reader = UserId("bob-id".into());

        for i in 0..4 {
            let msg = at(i, Message::user_text("alice", format!("m{i}"), false));
            log.append(&room, &msg).await.unwrap();
        }

        let history = log.history(&room, 50).await.unwrap();
        let count = log
            .mark_read_capped(&room, &reader, "bob", &history, 2)
            .await
            .unwrap();
        assert_eq!(count, 2);

        // The two oldest were acknowledged first.
        let after = log.history(&room, 50).await.unwrap();
        assert_eq!(after[0].read_by.len(), 1);
        assert_eq!(after[1].read_by.len(), 1);
        assert!(after[2].read_by.is_empty());
        assert!(after[3].read_by.is_empty());

        // A second pass drains the rest.
        let count = log
            .mark_read_capped(&room, &reader, "bob", &after, 2)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn watch_delivers_initial_and_appends() {
        let log = log();
        let room = RoomId("1234567".into());

        let mut feed = log.watch(&room).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        let msg = Message::user_text("alice", "hi".into(), false);
        log.append(&room, &msg).await.unwrap();

        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].content, "hi");

        feed.unsubscribe();
    }
}

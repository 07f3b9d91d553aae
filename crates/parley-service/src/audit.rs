//! Write-only system event log.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use parley_shared::types::LogLevel;
use parley_store::{from_document, to_document, Filter, Store};

use crate::models::{LogEntry, SYSTEM_LOGS};
use crate::{Result, ServiceError};

/// Append-only audit record writer.
///
/// Recording is best-effort: an audit write failure is logged and dropped
/// rather than failing the action being audited.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record one event.
    pub async fn record(&self, level: LogLevel, event: &str, details: impl Into<String>) {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event: event.to_string(),
            details: details.into(),
            level,
        };

        let doc = match to_document(&entry) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(event, error = %e, "failed to encode audit record");
                return;
            }
        };

        if let Err(e) = self.store.put(SYSTEM_LOGS, &entry.id, doc).await {
            warn!(event, error = %e, "failed to write audit record");
        }
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let docs = self.store.query(SYSTEM_LOGS, Filter::All).await?;

        let mut entries: Vec<LogEntry> = docs
            .into_iter()
            .filter_map(|doc| from_document(doc).ok())
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    /// The store contract has no transactional collection clear; say so
    /// instead of implying a deletion that did not happen.
    pub async fn clear(&self) -> Result<()> {
        Err(ServiceError::Unsupported(
            "audit log clearing is not transactional on this backend",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::MemoryStore;

    #[tokio::test]
    async fn record_then_recent_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store);

        audit.record(LogLevel::Info, "login", "alice logged in").await;
        audit.record(LogLevel::Warning, "moderation", "bob kicked").await;

        let entries = audit.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp >= entries[1].timestamp);
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store);

        for i in 0..5 {
            audit.record(LogLevel::Info, "event", format!("n{i}")).await;
        }

        assert_eq!(audit.recent(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn clear_is_reported_unsupported() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store);

        assert!(matches!(
            audit.clear().await,
            Err(ServiceError::Unsupported(_))
        ));
    }
}

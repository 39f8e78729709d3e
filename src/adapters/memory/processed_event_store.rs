//! In-memory processed-event store with a retention window.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, EventId, Timestamp};
use crate::ports::ProcessedEventStore;

/// Default retention: seven days.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// In-memory [`ProcessedEventStore`].
///
/// Entries older than the retention window count as unseen and are pruned
/// lazily on write.
#[derive(Debug, Clone)]
pub struct InMemoryProcessedEventStore {
    processed: Arc<RwLock<HashMap<EventId, Timestamp>>>,
    retention: Duration,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            processed: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    fn is_fresh(&self, marked_at: Timestamp, now: Timestamp) -> bool {
        now.duration_since(&marked_at).num_seconds() < self.retention.as_secs() as i64
    }

    pub async fn len(&self) -> usize {
        self.processed.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.processed.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.processed.write().await.clear();
    }
}

impl Default for InMemoryProcessedEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn contains(&self, event_id: &EventId) -> Result<bool, DomainError> {
        let now = Timestamp::now();
        Ok(self
            .processed
            .read()
            .await
            .get(event_id)
            .map(|marked_at| self.is_fresh(*marked_at, now))
            .unwrap_or(false))
    }

    async fn mark_processed(&self, event_id: &EventId) -> Result<(), DomainError> {
        let now = Timestamp::now();
        let mut processed = self.processed.write().await;
        processed.retain(|_, marked_at| self.is_fresh(*marked_at, now));
        processed.insert(event_id.clone(), now);
        Ok(())
    }
}

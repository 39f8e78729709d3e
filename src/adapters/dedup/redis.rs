//! Redis-backed processed-event store for multi-instance deployments.
//!
//! Each applied event id becomes a `SET key 1 EX <ttl>` entry, so Redis
//! expires the window on its own.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode, EventId};
use crate::ports::ProcessedEventStore;

/// Key namespace for processed event ids.
pub const PROCESSED_KEY_PREFIX: &str = "entitlement:processed:";

/// Redis implementation of [`ProcessedEventStore`].
#[derive(Clone)]
pub struct RedisProcessedEventStore {
    conn: MultiplexedConnection,
    retention: Duration,
}

impl RedisProcessedEventStore {
    pub fn new(conn: MultiplexedConnection, retention: Duration) -> Self {
        Self { conn, retention }
    }

    fn key(event_id: &EventId) -> String {
        format!("{}{}", PROCESSED_KEY_PREFIX, event_id.as_str())
    }
}

fn cache_error(context: &str, e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("{}: {}", context, e))
}

#[async_trait]
impl ProcessedEventStore for RedisProcessedEventStore {
    async fn contains(&self, event_id: &EventId) -> Result<bool, DomainError> {
        let mut conn = self.conn.clone();
        conn.exists(Self::key(event_id))
            .await
            .map_err(|e| cache_error("Failed to check processed event", e))
    }

    async fn mark_processed(&self, event_id: &EventId) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let ttl = self.retention.as_secs().max(1);
        redis::cmd("SET")
            .arg(Self::key(event_id))
            .arg(1)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| cache_error("Failed to mark event processed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_event_id() {
        let id = EventId::new("evt_123").unwrap();
        assert_eq!(
            RedisProcessedEventStore::key(&id),
            "entitlement:processed:evt_123"
        );
    }

    #[test]
    fn namespaced_event_ids_keep_their_prefix() {
        let id = EventId::namespaced("stripe:invoice", "in_1");
        assert_eq!(
            RedisProcessedEventStore::key(&id),
            "entitlement:processed:stripe:invoice:in_1"
        );
    }
}

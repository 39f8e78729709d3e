//! ProcessedEventStore port - delivery dedup window.
//!
//! The reconciler already ignores an event equal to the account's
//! `last_event_id`. That only covers the most recent event: once a newer
//! event has been applied, a redelivered refund would bypass the ordering
//! guard and apply again. This store remembers every applied event id for a
//! bounded window so such redeliveries are dropped before reconciliation.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventId};

/// Port for remembering which billing events were already applied.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` if the event was applied within the retention window.
    async fn contains(&self, event_id: &EventId) -> Result<bool, DomainError>;

    /// Records the event as applied. Calling it twice is harmless.
    ///
    /// Call this only after the entitlement write committed, so a failed
    /// write is retried on redelivery.
    async fn mark_processed(&self, event_id: &EventId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_event_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn ProcessedEventStore) {}
    }
}

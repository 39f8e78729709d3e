//! In-memory adapters for tests and local development.

mod entitlement_store;
mod processed_event_store;

pub use entitlement_store::InMemoryEntitlementStore;
pub use processed_event_store::{InMemoryProcessedEventStore, DEFAULT_RETENTION};

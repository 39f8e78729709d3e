//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresEntitlementStore` - account entitlement snapshots and links

mod entitlement_store;

pub use entitlement_store::PostgresEntitlementStore;

//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `app_store` - App Store JWS verification with a cached key set
//! - `stripe` - Stripe webhook verification, checkout and portal sessions
//! - `postgres` - entitlement persistence
//! - `dedup` - Redis delivery dedup window
//! - `memory` - in-memory stores for tests and local development
//! - `http` - axum routes

pub mod app_store;
pub mod dedup;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use app_store::{AppStoreJwsVerifier, HttpKeySource, KeyCache};
pub use dedup::RedisProcessedEventStore;
pub use memory::{InMemoryEntitlementStore, InMemoryProcessedEventStore};
pub use postgres::PostgresEntitlementStore;
pub use stripe::{MockPaymentProvider, StripePaymentAdapter, StripeWebhookVerifier};

//! Delivery dedup window backends.
//!
//! The in-memory variant lives in `adapters::memory`.

mod redis;

pub use self::redis::{RedisProcessedEventStore, PROCESSED_KEY_PREFIX};

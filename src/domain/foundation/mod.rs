//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, time, and error types that form the vocabulary
//! of the entitlement domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AccountId, EventId};
pub use timestamp::Timestamp;

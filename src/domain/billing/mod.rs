//! Billing domain - provider payloads and their normalization.
//!
//! Verifiers (in `adapters`) authenticate raw provider payloads into
//! [`VerifiedPayload`]s; the [`EventNormalizer`] turns those into canonical
//! entitlement events.

mod app_store;
mod normalizer;
mod stripe_event;
mod verification;

pub use app_store::{
    AppStoreNotification, AppStoreNotificationData, AppStoreRenewalInfo, AppStoreTransaction,
};
pub use normalizer::{EventNormalizer, NormalizeError};
pub use stripe_event::{StripeEvent, StripeEventData};
pub use verification::{content_hash_event_id, VerificationError, VerifiedPayload};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;

//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `EntitlementStore` - per-account snapshot with conditional replace
//! - `ProcessedEventStore` - delivery dedup window
//! - `NotificationVerifier` / `ReceiptVerifier` - payload authentication
//! - `PaymentProvider` - outbound checkout and portal sessions

mod entitlement_store;
mod notification_verifier;
mod payment_provider;
mod processed_event_store;

pub use entitlement_store::{EntitlementStore, LinkOutcome, WriteOutcome};
pub use notification_verifier::{NotificationVerifier, ReceiptVerifier};
pub use payment_provider::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession,
};
pub use processed_event_store::ProcessedEventStore;

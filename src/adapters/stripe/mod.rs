//! Stripe adapters.
//!
//! - `StripeWebhookVerifier`: `NotificationVerifier` for signed webhook deliveries
//! - `StripePaymentAdapter`: `PaymentProvider` plus `ReceiptVerifier` over the REST API
//! - `MockPaymentProvider`: in-process stand-in for both
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_verifier;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter, STRIPE_API_BASE};
pub use webhook_verifier::{
    signature_header, SignatureHeader, SignatureParseError, StripeWebhookVerifier,
    MAX_CLOCK_SKEW_SECS, MAX_EVENT_AGE_SECS,
};

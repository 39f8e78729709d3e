//! Verifier ports for provider notifications and client receipts.
//!
//! Both traits turn untrusted bytes into a [`VerifiedPayload`]. Implementations
//! hold no per-request state; the only side effect allowed is refreshing a
//! signing-key cache.

use async_trait::async_trait;

use crate::domain::billing::{VerificationError, VerifiedPayload};
use crate::domain::entitlement::ProviderKind;

/// Authenticates a provider's server-to-server notification.
#[async_trait]
pub trait NotificationVerifier: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Verifies `raw_payload` exactly as received.
    ///
    /// `signature` carries out-of-band signature material (the Stripe
    /// `Stripe-Signature` header). It is `None` for providers that embed the
    /// signature in the payload.
    async fn verify(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<VerifiedPayload, VerificationError>;
}

/// Authenticates a receipt presented by the client after a purchase.
#[async_trait]
pub trait ReceiptVerifier: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Verifies the receipt and returns the purchase it proves.
    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPayload, VerificationError>;
}

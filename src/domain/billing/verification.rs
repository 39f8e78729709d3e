//! Verification outcome types shared by every notification verifier.

use http::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{AppStoreNotification, AppStoreRenewalInfo, AppStoreTransaction, StripeEvent};
use crate::domain::entitlement::ProviderKind;
use crate::domain::foundation::EventId;

/// Errors that occur while authenticating a provider payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Signature absent, wrong, outside the replay window, or the
    /// certificate chain does not lead to the pinned root.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// The payload or its signature envelope could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The `kid` is not in the provider key set, even after a refresh.
    #[error("Unknown key id: {0}")]
    UnknownKeyId(String),

    /// The signing-key set or the provider API could not be reached, and no
    /// cached copy can answer.
    #[error("Verification source unavailable: {0}")]
    SourceUnavailable(String),
}

impl VerificationError {
    pub fn signature(reason: impl Into<String>) -> Self {
        VerificationError::SignatureInvalid(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        VerificationError::MalformedPayload(reason.into())
    }

    /// Returns true if the provider should redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerificationError::SourceUnavailable(_))
    }

    /// Maps the error to an HTTP status code.
    ///
    /// A 4xx tells the provider not to retry; an unreachable verification
    /// source is the only case where a later delivery can succeed.
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::SignatureInvalid(_)
            | VerificationError::MalformedPayload(_)
            | VerificationError::UnknownKeyId(_) => StatusCode::BAD_REQUEST,
            VerificationError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::SignatureInvalid(_) => "SIGNATURE_INVALID",
            VerificationError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            VerificationError::UnknownKeyId(_) => "UNKNOWN_KEY_ID",
            VerificationError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
        }
    }
}

/// An authenticated provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifiedPayload {
    /// A server notification with its nested transaction and renewal info.
    AppStoreNotification {
        event_id: EventId,
        notification: AppStoreNotification,
        transaction: Option<AppStoreTransaction>,
        renewal: Option<AppStoreRenewalInfo>,
    },

    /// A single signed transaction presented by the client.
    AppStoreTransaction {
        event_id: EventId,
        transaction: AppStoreTransaction,
    },

    /// A Stripe event, either delivered by webhook or reconstructed from an
    /// authoritative API read.
    Stripe { event_id: EventId, event: StripeEvent },
}

impl VerifiedPayload {
    pub fn event_id(&self) -> &EventId {
        match self {
            VerifiedPayload::AppStoreNotification { event_id, .. }
            | VerifiedPayload::AppStoreTransaction { event_id, .. }
            | VerifiedPayload::Stripe { event_id, .. } => event_id,
        }
    }

    pub fn provider_kind(&self) -> ProviderKind {
        match self {
            VerifiedPayload::AppStoreNotification { .. }
            | VerifiedPayload::AppStoreTransaction { .. } => ProviderKind::AppStore,
            VerifiedPayload::Stripe { .. } => ProviderKind::Stripe,
        }
    }
}

/// Content-derived idempotency key for payloads without a provider id.
pub fn content_hash_event_id(raw: &[u8]) -> EventId {
    let digest = Sha256::digest(raw);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    EventId::namespaced("sha256", hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Error Display Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn signature_invalid_displays_reason() {
        let err = VerificationError::signature("v1 mismatch");
        assert_eq!(format!("{}", err), "Invalid signature: v1 mismatch");
    }

    #[test]
    fn unknown_key_id_displays_kid() {
        let err = VerificationError::UnknownKeyId("abc".into());
        assert_eq!(format!("{}", err), "Unknown key id: abc");
    }

    // ══════════════════════════════════════════════════════════════
    // Status Code Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn verification_failures_are_bad_request() {
        for err in [
            VerificationError::signature("x"),
            VerificationError::malformed("x"),
            VerificationError::UnknownKeyId("x".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn source_unavailable_is_retryable_503() {
        let err = VerificationError::SourceUnavailable("timeout".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Content Hash Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn content_hash_is_stable_and_distinct() {
        let a = content_hash_event_id(b"payload-a");
        let b = content_hash_event_id(b"payload-a");
        let c = content_hash_event_id(b"payload-b");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("sha256:"));
        assert_eq!(a.as_str().len(), "sha256:".len() + 64);
    }
}

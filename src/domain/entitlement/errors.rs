//! Entitlement-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Verification | 400 (503 when the source is down) |
//! | UnusableReceipt | 400 |
//! | UnknownProduct | 400 |
//! | UnsupportedProvider | 400 |
//! | AccountNotFound | 404 |
//! | AccountAlreadyExists | 409 |
//! | DisallowedClientEvent | 409 |
//! | LinkConflict | 409 |
//! | NotLinked | 409 |
//! | ProviderUnavailable | 503 |
//! | WriteContention | 500 |
//! | Infrastructure | 500 |

use http::StatusCode;
use thiserror::Error;

use super::{EventKind, ProviderKind};
use crate::domain::billing::VerificationError;
use crate::domain::foundation::{AccountId, DomainError};

/// Errors surfaced by the entitlement use cases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The receipt verified but does not describe a usable purchase.
    #[error("Unusable receipt: {0}")]
    UnusableReceipt(String),

    /// Clients may only report purchases.
    #[error("Clients may not report {0} events")]
    DisallowedClientEvent(EventKind),

    #[error("Account {0} has no entitlement")]
    AccountNotFound(AccountId),

    #[error("Account {0} already has an entitlement")]
    AccountAlreadyExists(AccountId),

    /// The purchase's linking key conflicts with an existing link.
    #[error("Link conflict for {provider}: {reason}")]
    LinkConflict {
        provider: ProviderKind,
        reason: String,
    },

    /// The account has no link for a provider the operation needs.
    #[error("Account is not linked to {0}")]
    NotLinked(ProviderKind),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("No receipt verifier configured for {0}")]
    UnsupportedProvider(ProviderKind),

    /// An outbound payment-provider call failed.
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The conditional write lost every attempt.
    #[error("Write contention on account {account_id} after {attempts} attempts")]
    WriteContention { account_id: AccountId, attempts: u32 },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl EntitlementError {
    pub fn link_conflict(provider: ProviderKind, reason: impl Into<String>) -> Self {
        EntitlementError::LinkConflict {
            provider,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EntitlementError::Verification(e) => e.status_code(),
            EntitlementError::UnusableReceipt(_)
            | EntitlementError::UnknownProduct(_)
            | EntitlementError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            EntitlementError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            EntitlementError::AccountAlreadyExists(_)
            | EntitlementError::DisallowedClientEvent(_)
            | EntitlementError::LinkConflict { .. }
            | EntitlementError::NotLinked(_) => StatusCode::CONFLICT,
            EntitlementError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EntitlementError::WriteContention { .. } | EntitlementError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EntitlementError::Verification(e) => e.code(),
            EntitlementError::UnusableReceipt(_) => "UNUSABLE_RECEIPT",
            EntitlementError::DisallowedClientEvent(_) => "DISALLOWED_CLIENT_EVENT",
            EntitlementError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            EntitlementError::AccountAlreadyExists(_) => "ACCOUNT_ALREADY_EXISTS",
            EntitlementError::LinkConflict { .. } => "LINK_CONFLICT",
            EntitlementError::NotLinked(_) => "NOT_LINKED",
            EntitlementError::UnknownProduct(_) => "UNKNOWN_PRODUCT",
            EntitlementError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            EntitlementError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            EntitlementError::WriteContention { .. } => "WRITE_CONTENTION",
            EntitlementError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            EntitlementError::Verification(e) => e.is_retryable(),
            EntitlementError::ProviderUnavailable(_)
            | EntitlementError::WriteContention { .. }
            | EntitlementError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl From<DomainError> for EntitlementError {
    fn from(err: DomainError) -> Self {
        EntitlementError::Infrastructure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            EntitlementError::DisallowedClientEvent(EventKind::Expired).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EntitlementError::link_conflict(ProviderKind::Stripe, "owned").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EntitlementError::AccountNotFound(AccountId::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EntitlementError::UnknownProduct("price_x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn verification_errors_keep_their_status() {
        let bad = EntitlementError::from(VerificationError::signature("x"));
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.code(), "SIGNATURE_INVALID");

        let down = EntitlementError::from(VerificationError::SourceUnavailable("x".into()));
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(down.is_retryable());
    }

    #[test]
    fn provider_unavailable_is_retryable_503() {
        let err = EntitlementError::ProviderUnavailable("timeout".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
    }

    #[test]
    fn contention_is_server_error() {
        let err = EntitlementError::WriteContention {
            account_id: AccountId::new(),
            attempts: 3,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn domain_errors_become_infrastructure() {
        let err: EntitlementError = DomainError::new(ErrorCode::DatabaseError, "down").into();
        assert!(matches!(err, EntitlementError::Infrastructure(_)));
    }
}

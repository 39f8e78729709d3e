//! Billing provider identity and linking keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two billing platforms an entitlement can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Mobile store (App Store Server Notifications, signed JWS).
    AppStore,
    /// Web checkout (Stripe, HMAC-signed webhooks).
    Stripe,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AppStore => "app_store",
            ProviderKind::Stripe => "stripe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "app_store" => Some(ProviderKind::AppStore),
            "stripe" => Some(ProviderKind::Stripe),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `(provider, external id)` pair that resolves an inbound event to an account.
///
/// For the App Store the external id is the subscription's
/// `originalTransactionId`; for Stripe it is the customer id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkingKey {
    pub provider: ProviderKind,
    pub external_id: String,
}

impl LinkingKey {
    pub fn new(provider: ProviderKind, external_id: impl Into<String>) -> Self {
        Self {
            provider,
            external_id: external_id.into(),
        }
    }

    pub fn app_store(original_transaction_id: impl Into<String>) -> Self {
        Self::new(ProviderKind::AppStore, original_transaction_id)
    }

    pub fn stripe(customer_id: impl Into<String>) -> Self {
        Self::new(ProviderKind::Stripe, customer_id)
    }
}

impl fmt::Display for LinkingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.external_id)
    }
}

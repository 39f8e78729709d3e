//! The per-account entitlement snapshot.

use serde::{Deserialize, Serialize};

use super::{EntitlementStatus, LinkingKey, ProviderKind, Tier};
use crate::domain::foundation::{AccountId, EventId, Timestamp};

/// External identifiers linking an account to each provider.
///
/// Each link is set once and never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLinks {
    pub app_store_original_transaction_id: Option<String>,
    pub stripe_customer_id: Option<String>,
}

impl ProviderLinks {
    /// Returns the external id linked for `provider`, if any.
    pub fn get(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::AppStore => self.app_store_original_transaction_id.as_deref(),
            ProviderKind::Stripe => self.stripe_customer_id.as_deref(),
        }
    }

    /// Returns the linking key for `provider`, if linked.
    pub fn key_for(&self, provider: ProviderKind) -> Option<LinkingKey> {
        self.get(provider)
            .map(|id| LinkingKey::new(provider, id.to_string()))
    }

    pub(crate) fn set(&mut self, key: &LinkingKey) {
        let slot = match key.provider {
            ProviderKind::AppStore => &mut self.app_store_original_transaction_id,
            ProviderKind::Stripe => &mut self.stripe_customer_id,
        };
        *slot = Some(key.external_id.clone());
    }
}

/// Authoritative entitlement of one account.
///
/// Only the reconciler produces new values of the billing fields; the store
/// owns `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntitlement {
    pub account_id: AccountId,
    pub tier: Tier,
    pub status: EntitlementStatus,
    pub source_provider: Option<ProviderKind>,
    pub product_ref: Option<String>,
    pub expires_at: Option<Timestamp>,
    /// Occurred-at of the event that produced this snapshot. None only for
    /// the account-creation baseline.
    pub as_of: Option<Timestamp>,
    pub last_event_id: Option<EventId>,
    pub links: ProviderLinks,
    /// Optimistic concurrency counter, bumped on every committed replace.
    pub version: i64,
}

impl AccountEntitlement {
    /// The `{Free, None}` snapshot every account starts from.
    pub fn baseline(account_id: AccountId) -> Self {
        Self {
            account_id,
            tier: Tier::Free,
            status: EntitlementStatus::None,
            source_provider: None,
            product_ref: None,
            expires_at: None,
            as_of: None,
            last_event_id: None,
            links: ProviderLinks::default(),
            version: 0,
        }
    }

    /// Returns true once `expires_at` lies in the past for a lapsing status.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        self.status.is_lapsing()
            && self
                .expires_at
                .map(|expires| expires.is_before(&now))
                .unwrap_or(false)
    }

    /// Checks the `Expired => Free` invariant.
    pub fn is_consistent(&self) -> bool {
        self.status != EntitlementStatus::Expired || self.tier == Tier::Free
    }
}

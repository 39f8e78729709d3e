//! Provider-agnostic billing events.

use serde::{Deserialize, Serialize};

use super::{LinkingKey, ProviderKind};
use crate::domain::foundation::{AccountId, EventId, Timestamp};

/// Closed set of billing transitions every provider is normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Activated,
    Renewed,
    OfferRedeemed,
    EnteredGracePeriod,
    AutoRenewDisabled,
    AutoRenewEnabled,
    Expired,
    Refunded,
    RenewalInfoChanged,
}

impl EventKind {
    /// Kinds that grant a paid period. These are the only kinds a client
    /// is allowed to assert through receipt sync.
    pub fn is_purchase(&self) -> bool {
        matches!(
            self,
            EventKind::Activated | EventKind::Renewed | EventKind::OfferRedeemed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Activated => "activated",
            EventKind::Renewed => "renewed",
            EventKind::OfferRedeemed => "offer_redeemed",
            EventKind::EnteredGracePeriod => "entered_grace_period",
            EventKind::AutoRenewDisabled => "auto_renew_disabled",
            EventKind::AutoRenewEnabled => "auto_renew_enabled",
            EventKind::Expired => "expired",
            EventKind::Refunded => "refunded",
            EventKind::RenewalInfoChanged => "renewal_info_changed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified, normalized billing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub provider_kind: ProviderKind,
    pub kind: EventKind,
    pub linking_key: LinkingKey,
    pub product_ref: Option<String>,
    pub period_end: Option<Timestamp>,
    pub occurred_at: Timestamp,
    pub event_id: EventId,
    /// Account the provider says the purchase belongs to, if it carries one
    /// (App Store `appAccountToken`, Stripe `client_reference_id`). Used only
    /// to establish a link on first contact.
    pub account_hint: Option<AccountId>,
    /// Set only on sweep-synthesized expiries: the `expires_at` the sweep
    /// found lapsed. The event applies only while the snapshot is still
    /// lapsing with that same expiry.
    pub lapsed_expiry: Option<Timestamp>,
}

impl CanonicalEvent {
    /// Synthetic `Expired` event emitted by the expiry sweep.
    ///
    /// The id is derived from the account and the lapsed expiry, so a sweep
    /// that runs twice over the same lapse produces the same id.
    pub fn sweep_expired(
        account_id: AccountId,
        linking_key: LinkingKey,
        expires_at: Timestamp,
        occurred_at: Timestamp,
    ) -> Self {
        let event_id = EventId::namespaced(
            "sweep",
            format!("{}:{}", account_id, expires_at.as_unix_secs()),
        );

        Self {
            provider_kind: linking_key.provider,
            kind: EventKind::Expired,
            linking_key,
            product_ref: None,
            period_end: None,
            occurred_at,
            event_id,
            account_hint: Some(account_id),
            lapsed_expiry: Some(expires_at),
        }
    }
}

//! Entitlement state machine.
//!
//! Applies one canonical event to one account snapshot. The function is pure:
//! persistence and the per-account write ordering live in the application
//! layer, which retries on a lost conditional write by re-reading and calling
//! `reconcile` again.
//!
//! ## Guards (evaluated in order)
//!
//! 1. Duplicate: `event_id == last_event_id` is a no-op.
//! 2. Lapse: a sweep expiry is a no-op unless the snapshot is still lapsing
//!    with the expiry the sweep found.
//! 3. Ordering: a non-refund event older than `as_of` is a no-op.
//! 4. Informational kinds never change state.
//!
//! A refund is authoritative and skips the ordering guard.

use serde::{Deserialize, Serialize};

use super::{
    AccountEntitlement, CanonicalEvent, EntitlementStatus, EventKind, Tier, TierResolver,
};
use crate::domain::foundation::Timestamp;

/// Why an event left the snapshot untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    DuplicateEvent,
    StaleEvent,
    NoLongerLapsed,
    InformationalOnly,
}

impl NoOpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoOpReason::DuplicateEvent => "duplicate_event",
            NoOpReason::StaleEvent => "stale_event",
            NoOpReason::NoLongerLapsed => "no_longer_lapsed",
            NoOpReason::InformationalOnly => "informational_only",
        }
    }
}

/// A purchase event whose product could not be mapped to a tier.
///
/// The status transition still applies; the tier stays where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductIssue {
    Missing,
    Unknown(String),
}

/// A state change produced by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: AccountEntitlement,
    pub product_issue: Option<ProductIssue>,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Applied(Transition),
    NoOp(NoOpReason),
}

impl Reconciliation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Reconciliation::Applied(_))
    }

    /// The snapshot after applying the outcome to `current`.
    pub fn resulting(self, current: &AccountEntitlement) -> AccountEntitlement {
        match self {
            Reconciliation::Applied(t) => t.next,
            Reconciliation::NoOp(_) => current.clone(),
        }
    }
}

/// Applies canonical events to entitlement snapshots.
#[derive(Debug, Clone, Default)]
pub struct EntitlementReconciler {
    resolver: TierResolver,
}

impl EntitlementReconciler {
    pub fn new(resolver: TierResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TierResolver {
        &self.resolver
    }

    /// Applies `event` to `current`.
    pub fn reconcile(
        &self,
        current: &AccountEntitlement,
        event: &CanonicalEvent,
    ) -> Reconciliation {
        if current.last_event_id.as_ref() == Some(&event.event_id) {
            return Reconciliation::NoOp(NoOpReason::DuplicateEvent);
        }

        if let Some(lapsed) = event.lapsed_expiry {
            if !(current.status.is_lapsing() && current.expires_at == Some(lapsed)) {
                return Reconciliation::NoOp(NoOpReason::NoLongerLapsed);
            }
        }

        let is_refund = event.kind == EventKind::Refunded;
        if !is_refund && Self::is_stale(current, event.occurred_at) {
            return Reconciliation::NoOp(NoOpReason::StaleEvent);
        }

        let mut next = current.clone();
        let mut product_issue = None;

        match event.kind {
            EventKind::Activated | EventKind::Renewed | EventKind::OfferRedeemed => {
                match self.resolve_product(event) {
                    Ok(tier) => {
                        next.tier = tier;
                        next.product_ref = event.product_ref.clone();
                    }
                    Err(issue) => product_issue = Some(issue),
                }
                next.status = EntitlementStatus::Active;
                next.expires_at = event.period_end;
                next.source_provider = Some(event.provider_kind);
            }
            EventKind::EnteredGracePeriod => {
                next.status = EntitlementStatus::GracePeriod;
                if event.period_end.is_some() {
                    next.expires_at = event.period_end;
                }
            }
            EventKind::AutoRenewDisabled => {
                next.status = EntitlementStatus::PendingExpiry;
            }
            EventKind::AutoRenewEnabled => {
                next.status = EntitlementStatus::Active;
            }
            EventKind::Expired => {
                next.tier = Tier::Free;
                next.status = EntitlementStatus::Expired;
                next.expires_at = None;
                next.source_provider = None;
                next.product_ref = None;
            }
            EventKind::Refunded => {
                next.tier = Tier::Free;
                next.status = EntitlementStatus::None;
                next.expires_at = None;
                next.source_provider = None;
                next.product_ref = None;
            }
            EventKind::RenewalInfoChanged => {
                return Reconciliation::NoOp(NoOpReason::InformationalOnly);
            }
        }

        next.as_of = if is_refund {
            // Never move the ordering horizon backwards.
            Some(current.as_of.map_or(event.occurred_at, |as_of| as_of.max(event.occurred_at)))
        } else {
            Some(event.occurred_at)
        };
        next.last_event_id = Some(event.event_id.clone());

        Reconciliation::Applied(Transition {
            next,
            product_issue,
        })
    }

    fn is_stale(current: &AccountEntitlement, occurred_at: Timestamp) -> bool {
        current
            .as_of
            .map(|as_of| occurred_at.is_before(&as_of))
            .unwrap_or(false)
    }

    fn resolve_product(&self, event: &CanonicalEvent) -> Result<Tier, ProductIssue> {
        let product_ref = event.product_ref.as_deref().ok_or(ProductIssue::Missing)?;
        self.resolver
            .resolve(event.provider_kind, product_ref)
            .ok_or_else(|| ProductIssue::Unknown(product_ref.to_string()))
    }
}

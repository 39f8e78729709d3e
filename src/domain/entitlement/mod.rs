//! Entitlement domain - the authoritative tier/status per account.
//!
//! Billing events from either provider are reduced to [`CanonicalEvent`]s and
//! folded into an [`AccountEntitlement`] by the [`EntitlementReconciler`].
//! Feature code reads the result through [`AccessGate`].

mod access_gate;
mod errors;
mod event;
mod provider;
mod reconciler;
mod snapshot;
mod status;
mod tier;
mod tier_resolver;

pub use access_gate::{AccessGate, AccessResult, DenialReason, Feature, TierLimits};
pub use errors::EntitlementError;
pub use event::{CanonicalEvent, EventKind};
pub use provider::{LinkingKey, ProviderKind};
pub use reconciler::{
    EntitlementReconciler, NoOpReason, ProductIssue, Reconciliation, Transition,
};
pub use snapshot::{AccountEntitlement, ProviderLinks};
pub use status::EntitlementStatus;
pub use tier::Tier;
pub use tier_resolver::{ProductCatalog, TierResolver};

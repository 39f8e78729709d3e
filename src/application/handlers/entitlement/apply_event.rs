//! ApplyEventHandler - resolves the owning account and folds one canonical
//! event into its entitlement.
//!
//! Every write path (provider webhooks, client sync, expiry sweep) funnels
//! through here, so the dedup window, the reconciler and the conditional
//! replace are applied identically regardless of where the event came from.

use std::sync::Arc;

use crate::domain::entitlement::{
    AccountEntitlement, CanonicalEvent, EntitlementError, EntitlementReconciler, EventKind,
    NoOpReason, ProductIssue, Reconciliation,
};
use crate::domain::foundation::AccountId;
use crate::ports::{EntitlementStore, LinkOutcome, ProcessedEventStore, WriteOutcome};

/// Conditional-replace attempts before giving up with `WriteContention`.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The transition was committed.
    Applied(AccountEntitlement),
    /// The reconciler declined the event; the snapshot is unchanged.
    Unchanged {
        entitlement: AccountEntitlement,
        reason: NoOpReason,
    },
    /// The event id is inside the dedup window.
    AlreadyProcessed,
    /// No account owns the event's linking key and the hint did not resolve.
    UnresolvableAccount,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

/// Applies canonical events to stored entitlements.
pub struct ApplyEventHandler {
    store: Arc<dyn EntitlementStore>,
    processed: Arc<dyn ProcessedEventStore>,
    reconciler: EntitlementReconciler,
    max_attempts: u32,
}

impl ApplyEventHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        processed: Arc<dyn ProcessedEventStore>,
        reconciler: EntitlementReconciler,
    ) -> Self {
        Self {
            store,
            processed,
            reconciler,
            max_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn reconciler(&self) -> &EntitlementReconciler {
        &self.reconciler
    }

    /// Resolves the owning account from the event and applies it.
    pub async fn apply(&self, event: &CanonicalEvent) -> Result<ApplyOutcome, EntitlementError> {
        match self.resolve_account(event).await? {
            Some(account_id) => self.apply_to_account(&account_id, event).await,
            None => {
                tracing::warn!(
                    event_id = %event.event_id,
                    provider = %event.provider_kind,
                    linking_key = %event.linking_key,
                    kind = %event.kind,
                    "No account for linking key, dropping event"
                );
                Ok(ApplyOutcome::UnresolvableAccount)
            }
        }
    }

    /// Applies the event to a known account.
    pub async fn apply_to_account(
        &self,
        account_id: &AccountId,
        event: &CanonicalEvent,
    ) -> Result<ApplyOutcome, EntitlementError> {
        if self.processed.contains(&event.event_id).await? {
            tracing::debug!(
                event_id = %event.event_id,
                account_id = %account_id,
                "Event already processed"
            );
            return Ok(ApplyOutcome::AlreadyProcessed);
        }

        for attempt in 1..=self.max_attempts {
            let current = self
                .store
                .get(account_id)
                .await?
                .ok_or(EntitlementError::AccountNotFound(*account_id))?;

            let transition = match self.reconciler.reconcile(&current, event) {
                Reconciliation::NoOp(reason) => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        account_id = %account_id,
                        kind = %event.kind,
                        reason = reason.as_str(),
                        "Event did not change entitlement"
                    );
                    return Ok(ApplyOutcome::Unchanged {
                        entitlement: current,
                        reason,
                    });
                }
                Reconciliation::Applied(transition) => transition,
            };

            if let Some(issue) = &transition.product_issue {
                let product_ref = match issue {
                    ProductIssue::Missing => "<none>",
                    ProductIssue::Unknown(product_ref) => product_ref.as_str(),
                };
                tracing::warn!(
                    event_id = %event.event_id,
                    account_id = %account_id,
                    provider = %event.provider_kind,
                    product_ref,
                    "Unresolvable product, applying status-only transition"
                );
            }

            let is_refund = event.kind == EventKind::Refunded;
            match self
                .store
                .replace(&transition.next, current.version, is_refund)
                .await?
            {
                WriteOutcome::Committed(saved) => {
                    // The write is durable; a missed ledger entry only widens
                    // the redelivery window.
                    if let Err(e) = self.processed.mark_processed(&event.event_id).await {
                        tracing::warn!(
                            event_id = %event.event_id,
                            account_id = %account_id,
                            error = %e,
                            "Entitlement updated but event not recorded as processed"
                        );
                    }
                    tracing::info!(
                        event_id = %event.event_id,
                        account_id = %account_id,
                        provider = %event.provider_kind,
                        kind = %event.kind,
                        tier = %saved.tier,
                        status = %saved.status,
                        "Entitlement updated"
                    );
                    return Ok(ApplyOutcome::Applied(saved));
                }
                WriteOutcome::Conflict => {
                    tracing::debug!(
                        event_id = %event.event_id,
                        account_id = %account_id,
                        attempt,
                        "Conditional write lost, re-reading"
                    );
                }
            }
        }

        Err(EntitlementError::WriteContention {
            account_id: *account_id,
            attempts: self.max_attempts,
        })
    }

    /// Stored link first, then the event's account hint if that account
    /// exists and can take the link.
    async fn resolve_account(
        &self,
        event: &CanonicalEvent,
    ) -> Result<Option<AccountId>, EntitlementError> {
        if let Some(owner) = self.store.find_by_linking_key(&event.linking_key).await? {
            return Ok(Some(owner));
        }

        let Some(hint) = event.account_hint else {
            return Ok(None);
        };
        if self.store.get(&hint).await?.is_none() {
            return Ok(None);
        }

        match self.store.link(&hint, &event.linking_key).await? {
            LinkOutcome::Linked | LinkOutcome::AlreadyLinked => Ok(Some(hint)),
            LinkOutcome::KeyOwnedByOtherAccount(owner) => Ok(Some(owner)),
            LinkOutcome::AccountHasOtherKey(existing) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    account_id = %hint,
                    provider = %event.provider_kind,
                    existing_key = %existing,
                    "Hinted account is linked to a different key"
                );
                Ok(None)
            }
        }
    }
}

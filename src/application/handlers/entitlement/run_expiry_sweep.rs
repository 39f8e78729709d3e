//! RunExpirySweepHandler - Command handler for the periodic expiry sweep.
//!
//! Providers do not always send a final expiry notification. The sweep finds
//! lapsing entitlements whose `expires_at` has passed and applies a synthetic
//! `Expired` event to each, through the same path as provider events.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::apply_event::{ApplyEventHandler, ApplyOutcome};
use crate::domain::entitlement::{
    AccountEntitlement, CanonicalEvent, EntitlementError, LinkingKey, ProviderKind,
};
use crate::domain::foundation::Timestamp;
use crate::ports::EntitlementStore;

pub const DEFAULT_SWEEP_BATCH_SIZE: u32 = 500;
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Command to run one sweep pass.
#[derive(Debug, Clone, Copy)]
pub struct RunExpirySweepCommand {
    pub now: Timestamp,
}

/// Counts for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunExpirySweepResult {
    /// Lapsed rows found.
    pub examined: u32,
    /// Rows actually moved to `Expired`.
    pub expired: u32,
}

pub struct RunExpirySweepHandler {
    store: Arc<dyn EntitlementStore>,
    applier: Arc<ApplyEventHandler>,
    batch_size: u32,
    concurrency: usize,
}

impl RunExpirySweepHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, applier: Arc<ApplyEventHandler>) -> Self {
        Self {
            store,
            applier,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn handle(
        &self,
        cmd: RunExpirySweepCommand,
    ) -> Result<RunExpirySweepResult, EntitlementError> {
        let lapsed = self.store.find_lapsed(cmd.now, self.batch_size).await?;
        let examined = lapsed.len() as u32;

        let expired = stream::iter(lapsed)
            .map(|row| self.expire(row))
            .buffer_unordered(self.concurrency)
            .filter(|applied| futures::future::ready(*applied))
            .count()
            .await as u32;

        tracing::info!(examined, expired, "Expiry sweep finished");
        Ok(RunExpirySweepResult { examined, expired })
    }

    /// Returns true if the row was moved to `Expired`. Failures are logged;
    /// the row stays lapsed and the next pass picks it up again.
    ///
    /// The event targets the scanned `expires_at`, so a renewal or grace
    /// extension committed after the scan turns it into a no-op.
    async fn expire(&self, row: AccountEntitlement) -> bool {
        let Some(expires_at) = row.expires_at else {
            return false;
        };
        let occurred_at = row.as_of.map_or(expires_at, |as_of| as_of.max(expires_at));
        let event = CanonicalEvent::sweep_expired(
            row.account_id,
            sweep_linking_key(&row),
            expires_at,
            occurred_at,
        );

        match self.applier.apply_to_account(&row.account_id, &event).await {
            Ok(ApplyOutcome::Applied(_)) => true,
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(
                    account_id = %row.account_id,
                    event_id = %event.event_id,
                    error = %e,
                    "Expiry sweep could not expire entitlement"
                );
                false
            }
        }
    }
}

/// The key of the provider that granted the entitlement, falling back to
/// any stored link.
fn sweep_linking_key(row: &AccountEntitlement) -> LinkingKey {
    row.source_provider
        .and_then(|provider| row.links.key_for(provider))
        .or_else(|| row.links.key_for(ProviderKind::AppStore))
        .or_else(|| row.links.key_for(ProviderKind::Stripe))
        .unwrap_or_else(|| {
            LinkingKey::new(
                row.source_provider.unwrap_or(ProviderKind::Stripe),
                row.account_id.to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryEntitlementStore, InMemoryProcessedEventStore};
    use crate::domain::entitlement::{EntitlementReconciler, EntitlementStatus, EventKind, Tier};
    use crate::domain::foundation::{AccountId, EventId};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn lapsing(status: EntitlementStatus, expires: i64) -> AccountEntitlement {
        let mut row = AccountEntitlement::baseline(AccountId::new());
        row.tier = Tier::Pro;
        row.status = status;
        row.source_provider = Some(ProviderKind::Stripe);
        row.product_ref = Some("price_pro_monthly".into());
        row.expires_at = Some(ts(expires));
        row.as_of = Some(ts(expires - 86_400));
        row.links.stripe_customer_id = Some("cus_1".into());
        row
    }

    fn handler(store: &InMemoryEntitlementStore) -> RunExpirySweepHandler {
        let applier = Arc::new(ApplyEventHandler::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryProcessedEventStore::new()),
            EntitlementReconciler::default(),
        ));
        RunExpirySweepHandler::new(Arc::new(store.clone()), applier).with_concurrency(2)
    }

    #[tokio::test]
    async fn expires_lapsed_rows_only() {
        let store = InMemoryEntitlementStore::new();
        let grace = lapsing(EntitlementStatus::GracePeriod, 1_000);
        let pending = lapsing(EntitlementStatus::PendingExpiry, 1_500);
        let future = lapsing(EntitlementStatus::PendingExpiry, 9_000);
        let active = lapsing(EntitlementStatus::Active, 1_000);
        for row in [&grace, &pending, &future, &active] {
            store.seed(row.clone()).await;
        }

        let result = handler(&store)
            .handle(RunExpirySweepCommand { now: ts(2_000) })
            .await
            .unwrap();

        assert_eq!(result, RunExpirySweepResult { examined: 2, expired: 2 });
        for id in [grace.account_id, pending.account_id] {
            let row = store.get(&id).await.unwrap().unwrap();
            assert_eq!(row.status, EntitlementStatus::Expired);
            assert_eq!(row.tier, Tier::Free);
            assert_eq!(row.links.stripe_customer_id.as_deref(), Some("cus_1"));
        }
        let untouched = store.get(&future.account_id).await.unwrap().unwrap();
        assert_eq!(untouched.status, EntitlementStatus::PendingExpiry);
        let active_row = store.get(&active.account_id).await.unwrap().unwrap();
        assert_eq!(active_row.tier, Tier::Pro);
    }

    #[tokio::test]
    async fn second_pass_finds_nothing() {
        let store = InMemoryEntitlementStore::new();
        store.seed(lapsing(EntitlementStatus::GracePeriod, 1_000)).await;
        let handler = handler(&store);

        handler.handle(RunExpirySweepCommand { now: ts(2_000) }).await.unwrap();
        let second = handler
            .handle(RunExpirySweepCommand { now: ts(3_000) })
            .await
            .unwrap();

        assert_eq!(second, RunExpirySweepResult::default());
    }

    #[tokio::test]
    async fn batch_size_bounds_one_pass() {
        let store = InMemoryEntitlementStore::new();
        for expires in [1_000, 1_100, 1_200] {
            store.seed(lapsing(EntitlementStatus::GracePeriod, expires)).await;
        }

        let result = handler(&store)
            .with_batch_size(2)
            .handle(RunExpirySweepCommand { now: ts(2_000) })
            .await
            .unwrap();

        assert_eq!(result.examined, 2);
    }

    #[tokio::test]
    async fn renewal_between_scan_and_write_survives_sweep() {
        let store = InMemoryEntitlementStore::new();
        let mut row = lapsing(EntitlementStatus::GracePeriod, 1_000);
        row.as_of = Some(ts(900));
        store.seed(row.clone()).await;
        let handler = handler(&store);

        let scanned = store.find_lapsed(ts(2_000), 10).await.unwrap();
        assert_eq!(scanned.len(), 1);

        let renewal = CanonicalEvent {
            provider_kind: ProviderKind::Stripe,
            kind: EventKind::Renewed,
            linking_key: LinkingKey::stripe("cus_1"),
            product_ref: Some("price_pro_monthly".into()),
            period_end: Some(ts(5_000)),
            occurred_at: ts(950),
            event_id: EventId::new("evt_retry_paid").unwrap(),
            account_hint: None,
            lapsed_expiry: None,
        };
        assert!(handler
            .applier
            .apply_to_account(&row.account_id, &renewal)
            .await
            .unwrap()
            .is_applied());

        let expired = handler.expire(scanned[0].clone()).await;

        assert!(!expired);
        let stored = store.get(&row.account_id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntitlementStatus::Active);
        assert_eq!(stored.tier, Tier::Pro);
        assert_eq!(stored.expires_at, Some(ts(5_000)));
    }

    #[test]
    fn linking_key_prefers_source_provider() {
        let mut row = lapsing(EntitlementStatus::GracePeriod, 1_000);
        row.links.app_store_original_transaction_id = Some("2000".into());
        assert_eq!(sweep_linking_key(&row), LinkingKey::stripe("cus_1"));

        row.source_provider = None;
        assert_eq!(sweep_linking_key(&row), LinkingKey::app_store("2000"));
    }
}

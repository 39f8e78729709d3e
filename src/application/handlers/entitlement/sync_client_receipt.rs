//! SyncClientReceiptHandler - Command handler for purchases reported by the
//! client right after checkout, ahead of the provider's own notification.
//!
//! The receipt is verified server-side (signed transaction for the App
//! Store, authoritative session read for Stripe), so the client can only
//! speed up a grant the provider will confirm anyway.

use std::collections::HashMap;
use std::sync::Arc;

use super::apply_event::{ApplyEventHandler, ApplyOutcome};
use crate::domain::billing::{EventNormalizer, NormalizeError};
use crate::domain::entitlement::{AccountEntitlement, EntitlementError, ProviderKind};
use crate::domain::foundation::AccountId;
use crate::ports::{EntitlementStore, LinkOutcome, ReceiptVerifier};

/// Command to sync a client-presented receipt.
#[derive(Debug, Clone)]
pub struct SyncClientReceiptCommand {
    pub account_id: AccountId,
    pub provider_kind: ProviderKind,
    /// Signed transaction JWS (App Store) or checkout session id (Stripe).
    pub receipt: String,
}

/// Handler for client receipt sync.
pub struct SyncClientReceiptHandler {
    verifiers: HashMap<ProviderKind, Arc<dyn ReceiptVerifier>>,
    normalizer: EventNormalizer,
    store: Arc<dyn EntitlementStore>,
    applier: Arc<ApplyEventHandler>,
}

impl SyncClientReceiptHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, applier: Arc<ApplyEventHandler>) -> Self {
        Self {
            verifiers: HashMap::new(),
            normalizer: EventNormalizer::new(),
            store,
            applier,
        }
    }

    /// Registers the verifier for the provider it reports.
    pub fn with_verifier(mut self, verifier: Arc<dyn ReceiptVerifier>) -> Self {
        self.verifiers.insert(verifier.provider(), verifier);
        self
    }

    pub async fn handle(
        &self,
        cmd: SyncClientReceiptCommand,
    ) -> Result<AccountEntitlement, EntitlementError> {
        let verifier = self
            .verifiers
            .get(&cmd.provider_kind)
            .ok_or(EntitlementError::UnsupportedProvider(cmd.provider_kind))?;

        // 1. Verify
        let payload = verifier.verify_receipt(&cmd.receipt).await.map_err(|e| {
            tracing::warn!(
                account_id = %cmd.account_id,
                provider = %cmd.provider_kind,
                error = %e,
                "Client receipt verification failed"
            );
            e
        })?;

        // 2. Normalize and gate
        let event = self.normalizer.normalize(&payload).map_err(|e| match e {
            NormalizeError::UnmappableEventType { event_type, .. } => {
                EntitlementError::UnusableReceipt(format!("not a completed purchase: {}", event_type))
            }
            other => EntitlementError::UnusableReceipt(other.to_string()),
        })?;

        if !event.kind.is_purchase() {
            tracing::warn!(
                account_id = %cmd.account_id,
                provider = %cmd.provider_kind,
                kind = %event.kind,
                "Client reported a non-purchase event"
            );
            return Err(EntitlementError::DisallowedClientEvent(event.kind));
        }

        // 3. Link
        if self.store.get(&cmd.account_id).await?.is_none() {
            return Err(EntitlementError::AccountNotFound(cmd.account_id));
        }
        match self.store.link(&cmd.account_id, &event.linking_key).await? {
            LinkOutcome::Linked | LinkOutcome::AlreadyLinked => {}
            LinkOutcome::AccountHasOtherKey(existing) => {
                return Err(EntitlementError::link_conflict(
                    cmd.provider_kind,
                    format!("account is linked to {}", existing),
                ));
            }
            LinkOutcome::KeyOwnedByOtherAccount(_) => {
                return Err(EntitlementError::link_conflict(
                    cmd.provider_kind,
                    "purchase belongs to another account",
                ));
            }
        }

        // 4. Apply
        match self.applier.apply_to_account(&cmd.account_id, &event).await? {
            ApplyOutcome::Applied(entitlement) | ApplyOutcome::Unchanged { entitlement, .. } => {
                Ok(entitlement)
            }
            ApplyOutcome::AlreadyProcessed | ApplyOutcome::UnresolvableAccount => self
                .store
                .get(&cmd.account_id)
                .await?
                .ok_or(EntitlementError::AccountNotFound(cmd.account_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::app_store::fixtures;
    use crate::adapters::memory::{InMemoryEntitlementStore, InMemoryProcessedEventStore};
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::VerificationError;
    use crate::domain::entitlement::{
        EntitlementReconciler, EntitlementStatus, EventKind, LinkingKey, Tier,
    };
    use serde_json::json;

    struct Fixture {
        store: InMemoryEntitlementStore,
        stripe: MockPaymentProvider,
        handler: SyncClientReceiptHandler,
    }

    fn fixture() -> Fixture {
        let store = InMemoryEntitlementStore::new();
        let applier = Arc::new(ApplyEventHandler::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryProcessedEventStore::new()),
            EntitlementReconciler::default(),
        ));
        let (app_store, _) = fixtures::verifier();
        let stripe = MockPaymentProvider::new();
        let handler = SyncClientReceiptHandler::new(Arc::new(store.clone()), applier)
            .with_verifier(Arc::new(app_store))
            .with_verifier(Arc::new(stripe.clone()));
        Fixture {
            store,
            stripe,
            handler,
        }
    }

    async fn account(f: &Fixture) -> AccountId {
        let account_id = AccountId::new();
        f.store.create_baseline(&account_id).await.unwrap();
        account_id
    }

    fn transaction(revoked: bool) -> String {
        let mut claims = json!({
            "transactionId": "2000000001",
            "originalTransactionId": "2000000001",
            "productId": "pro-yearly",
            "bundleId": fixtures::BUNDLE_ID,
            "purchaseDate": 1_700_000_000_000i64,
            "expiresDate": 1_731_536_000_000i64,
            "signedDate": 1_700_000_000_500i64
        });
        if revoked {
            claims["revocationDate"] = json!(1_700_100_000_000i64);
        }
        fixtures::sign(&claims)
    }

    fn command(account_id: AccountId, provider_kind: ProviderKind, receipt: String) -> SyncClientReceiptCommand {
        SyncClientReceiptCommand {
            account_id,
            provider_kind,
            receipt,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // App Store
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn signed_transaction_grants_tier_and_links() {
        let f = fixture();
        let account_id = account(&f).await;

        let entitlement = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, transaction(false)))
            .await
            .unwrap();

        assert_eq!(entitlement.tier, Tier::Pro);
        assert_eq!(entitlement.status, EntitlementStatus::Active);
        assert_eq!(
            entitlement.links.app_store_original_transaction_id.as_deref(),
            Some("2000000001")
        );
    }

    #[tokio::test]
    async fn repeated_sync_returns_same_snapshot() {
        let f = fixture();
        let account_id = account(&f).await;

        let first = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, transaction(false)))
            .await
            .unwrap();
        let second = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, transaction(false)))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn revoked_transaction_is_disallowed() {
        let f = fixture();
        let account_id = account(&f).await;

        let err = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, transaction(true)))
            .await
            .unwrap_err();

        assert_eq!(err, EntitlementError::DisallowedClientEvent(EventKind::Refunded));
        let stored = f.store.get(&account_id).await.unwrap().unwrap();
        assert_eq!(stored.tier, Tier::Free);
        assert!(stored.links.app_store_original_transaction_id.is_none());
    }

    #[tokio::test]
    async fn purchase_owned_by_other_account_conflicts() {
        let f = fixture();
        let owner = account(&f).await;
        f.store
            .link(&owner, &LinkingKey::app_store("2000000001"))
            .await
            .unwrap();
        let intruder = account(&f).await;

        let err = f
            .handler
            .handle(command(intruder, ProviderKind::AppStore, transaction(false)))
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::LinkConflict { .. }));
    }

    #[tokio::test]
    async fn forged_receipt_is_rejected() {
        let f = fixture();
        let account_id = account(&f).await;

        let err = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, "eyJhbGciOiJFUzI1NiJ9.e30.sig".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::Verification(_)));
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let f = fixture();
        let account_id = AccountId::new();

        let err = f
            .handler
            .handle(command(account_id, ProviderKind::AppStore, transaction(false)))
            .await
            .unwrap_err();

        assert_eq!(err, EntitlementError::AccountNotFound(account_id));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Stripe
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_checkout_session_grants_tier() {
        let f = fixture();
        let account_id = account(&f).await;
        f.stripe.add_checkout_session(json!({
            "id": "cs_paid",
            "created": 1_700_000_000,
            "status": "complete",
            "payment_status": "paid",
            "customer": "cus_7",
            "metadata": { "price_id": "price_team_yearly" },
            "subscription": { "current_period_end": 1_731_536_000 }
        }));

        let entitlement = f
            .handler
            .handle(command(account_id, ProviderKind::Stripe, "cs_paid".into()))
            .await
            .unwrap();

        assert_eq!(entitlement.tier, Tier::Team);
        assert_eq!(entitlement.links.stripe_customer_id.as_deref(), Some("cus_7"));
    }

    #[tokio::test]
    async fn open_checkout_session_is_unusable() {
        let f = fixture();
        let account_id = account(&f).await;
        f.stripe.add_checkout_session(json!({
            "id": "cs_open",
            "created": 1_700_000_000,
            "status": "open",
            "payment_status": "unpaid",
            "customer": "cus_7"
        }));

        let err = f
            .handler
            .handle(command(account_id, ProviderKind::Stripe, "cs_open".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::UnusableReceipt(_)));
    }

    #[tokio::test]
    async fn stripe_outage_is_retryable() {
        let f = fixture();
        let account_id = account(&f).await;
        f.stripe.set_receipts_unavailable(true);

        let err = f
            .handler
            .handle(command(account_id, ProviderKind::Stripe, "cs_any".into()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EntitlementError::Verification(VerificationError::SourceUnavailable("mock outage".into()))
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unregistered_provider_is_unsupported() {
        let store = InMemoryEntitlementStore::new();
        let applier = Arc::new(ApplyEventHandler::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryProcessedEventStore::new()),
            EntitlementReconciler::default(),
        ));
        let handler = SyncClientReceiptHandler::new(Arc::new(store), applier);

        let err = handler
            .handle(command(AccountId::new(), ProviderKind::Stripe, "cs_1".into()))
            .await
            .unwrap_err();

        assert_eq!(err, EntitlementError::UnsupportedProvider(ProviderKind::Stripe));
    }
}

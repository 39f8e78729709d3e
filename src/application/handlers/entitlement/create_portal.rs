//! CreatePortalHandler - Command handler for the hosted billing portal.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, ProviderKind};
use crate::domain::foundation::AccountId;
use crate::ports::{EntitlementStore, PaymentProvider};

/// Command to open a billing portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalCommand {
    pub account_id: AccountId,
    pub return_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePortalResult {
    pub portal_url: String,
}

/// Handler for billing portal sessions. Only accounts with a Stripe
/// customer have anything to manage there.
pub struct CreatePortalHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
}

impl CreatePortalHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, payment_provider: Arc<dyn PaymentProvider>) -> Self {
        Self {
            store,
            payment_provider,
        }
    }

    pub async fn handle(&self, cmd: CreatePortalCommand) -> Result<CreatePortalResult, EntitlementError> {
        let entitlement = self
            .store
            .get(&cmd.account_id)
            .await?
            .ok_or(EntitlementError::AccountNotFound(cmd.account_id))?;

        let customer_id = entitlement
            .links
            .get(ProviderKind::Stripe)
            .ok_or(EntitlementError::NotLinked(ProviderKind::Stripe))?;

        let session = self
            .payment_provider
            .create_portal_session(customer_id, &cmd.return_url)
            .await
            .map_err(|e| {
                tracing::warn!(account_id = %cmd.account_id, error = %e, "Portal session creation failed");
                EntitlementError::ProviderUnavailable(e.to_string())
            })?;

        Ok(CreatePortalResult {
            portal_url: session.url,
        })
    }
}

//! CreateCheckoutHandler - Command handler for starting a web checkout.
//!
//! The session carries the account id as `client_reference_id`, so the
//! provider's completion webhook can link the new customer to this account.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, ProviderKind, TierResolver};
use crate::domain::foundation::AccountId;
use crate::ports::{CreateCheckoutRequest, EntitlementStore, PaymentProvider};

/// Command to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub account_id: AccountId,
    /// Stripe price id of the plan being bought.
    pub product_ref: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of checkout creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutResult {
    pub session_id: String,
    pub checkout_url: String,
}

/// Handler for creating checkout sessions.
pub struct CreateCheckoutHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    resolver: TierResolver,
}

impl CreateCheckoutHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        payment_provider: Arc<dyn PaymentProvider>,
        resolver: TierResolver,
    ) -> Self {
        Self {
            store,
            payment_provider,
            resolver,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, EntitlementError> {
        if !self.resolver.is_known(ProviderKind::Stripe, &cmd.product_ref) {
            return Err(EntitlementError::UnknownProduct(cmd.product_ref));
        }

        let entitlement = self
            .store
            .get(&cmd.account_id)
            .await?
            .ok_or(EntitlementError::AccountNotFound(cmd.account_id))?;

        let request = CreateCheckoutRequest {
            account_id: cmd.account_id,
            product_ref: cmd.product_ref,
            customer_id: entitlement
                .links
                .get(ProviderKind::Stripe)
                .map(str::to_string),
            success_url: cmd.success_url,
            cancel_url: cmd.cancel_url,
        };

        let session = self
            .payment_provider
            .create_checkout_session(request)
            .await
            .map_err(|e| {
                tracing::warn!(account_id = %cmd.account_id, error = %e, "Checkout session creation failed");
                EntitlementError::ProviderUnavailable(e.to_string())
            })?;

        tracing::info!(account_id = %cmd.account_id, session_id = %session.id, "Checkout session created");

        Ok(CreateCheckoutResult {
            session_id: session.id,
            checkout_url: session.url,
        })
    }
}

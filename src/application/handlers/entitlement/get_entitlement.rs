//! GetEntitlementHandler - Query handler for an account's current entitlement.

use std::sync::Arc;

use crate::domain::entitlement::{AccessGate, AccountEntitlement, EntitlementError, TierLimits};
use crate::domain::foundation::AccountId;
use crate::ports::EntitlementStore;

/// Query to get an account's entitlement.
#[derive(Debug, Clone)]
pub struct GetEntitlementQuery {
    pub account_id: AccountId,
}

/// The stored snapshot with the limits its tier grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetEntitlementResult {
    pub entitlement: AccountEntitlement,
    pub limits: TierLimits,
}

/// Handler for reading entitlements.
pub struct GetEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl GetEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: GetEntitlementQuery,
    ) -> Result<GetEntitlementResult, EntitlementError> {
        let entitlement = self
            .store
            .get(&query.account_id)
            .await?
            .ok_or(EntitlementError::AccountNotFound(query.account_id))?;

        Ok(GetEntitlementResult {
            limits: AccessGate::limits(entitlement.tier),
            entitlement,
        })
    }
}

//! CheckAccessHandler - Query handler for feature gates.
//!
//! This is the most frequently called query. It reads the snapshot and
//! defers every decision to [`AccessGate`].

use std::sync::Arc;

use crate::domain::entitlement::{AccessGate, AccessResult, EntitlementError, Feature, Tier};
use crate::domain::foundation::AccountId;
use crate::ports::EntitlementStore;

/// Query to check whether an account may use a feature.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub account_id: AccountId,
    pub feature: Feature,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAccessResult {
    pub tier: Tier,
    pub access: AccessResult,
}

/// Handler for checking feature access.
pub struct CheckAccessHandler {
    store: Arc<dyn EntitlementStore>,
}

impl CheckAccessHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: CheckAccessQuery) -> Result<CheckAccessResult, EntitlementError> {
        let tier = self
            .store
            .get(&query.account_id)
            .await?
            .map(|e| e.tier)
            .ok_or(EntitlementError::AccountNotFound(query.account_id))?;

        Ok(CheckAccessResult {
            tier,
            access: AccessGate::check(tier, query.feature),
        })
    }
}

//! CreateAccountEntitlementHandler - Command handler run when an account is
//! created. Every account starts at the `{Free, None}` baseline.

use std::sync::Arc;

use crate::domain::entitlement::{AccountEntitlement, EntitlementError};
use crate::domain::foundation::{AccountId, ErrorCode};
use crate::ports::EntitlementStore;

#[derive(Debug, Clone)]
pub struct CreateAccountEntitlementCommand {
    pub account_id: AccountId,
}

pub struct CreateAccountEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl CreateAccountEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        cmd: CreateAccountEntitlementCommand,
    ) -> Result<AccountEntitlement, EntitlementError> {
        let created = self
            .store
            .create_baseline(&cmd.account_id)
            .await
            .map_err(|e| match e.code {
                ErrorCode::AccountAlreadyExists => EntitlementError::AccountAlreadyExists(cmd.account_id),
                _ => EntitlementError::from(e),
            })?;

        tracing::info!(account_id = %cmd.account_id, "Baseline entitlement created");
        Ok(created)
    }
}

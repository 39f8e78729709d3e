//! In-memory entitlement store.
//!
//! Rows and the linking-key index sit behind one lock, so `link` and
//! `replace` are atomic the same way the Postgres statements are.
//! Useful for tests and single-process development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entitlement::{AccountEntitlement, LinkingKey};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, Timestamp};
use crate::ports::{EntitlementStore, LinkOutcome, WriteOutcome};

#[derive(Debug, Default)]
struct State {
    rows: HashMap<AccountId, AccountEntitlement>,
    links: HashMap<LinkingKey, AccountId>,
}

/// In-memory [`EntitlementStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a row as-is, including links. Test setup only.
    pub async fn seed(&self, entitlement: AccountEntitlement) {
        let mut state = self.state.write().await;
        for key in [
            entitlement.links.key_for(crate::domain::entitlement::ProviderKind::AppStore),
            entitlement.links.key_for(crate::domain::entitlement::ProviderKind::Stripe),
        ]
        .into_iter()
        .flatten()
        {
            state.links.insert(key, entitlement.account_id);
        }
        state.rows.insert(entitlement.account_id, entitlement);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn not_found(account_id: &AccountId) -> DomainError {
    DomainError::new(ErrorCode::AccountNotFound, "Account entitlement not found")
        .with_detail("account_id", account_id.to_string())
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<AccountEntitlement>, DomainError> {
        Ok(self.state.read().await.rows.get(account_id).cloned())
    }

    async fn create_baseline(&self, account_id: &AccountId) -> Result<AccountEntitlement, DomainError> {
        let mut state = self.state.write().await;
        if state.rows.contains_key(account_id) {
            return Err(DomainError::new(
                ErrorCode::AccountAlreadyExists,
                "Account entitlement already exists",
            )
            .with_detail("account_id", account_id.to_string()));
        }
        let baseline = AccountEntitlement::baseline(*account_id);
        state.rows.insert(*account_id, baseline.clone());
        Ok(baseline)
    }

    async fn find_by_linking_key(&self, key: &LinkingKey) -> Result<Option<AccountId>, DomainError> {
        Ok(self.state.read().await.links.get(key).copied())
    }

    async fn link(&self, account_id: &AccountId, key: &LinkingKey) -> Result<LinkOutcome, DomainError> {
        let mut state = self.state.write().await;

        if let Some(owner) = state.links.get(key) {
            return Ok(if owner == account_id {
                LinkOutcome::AlreadyLinked
            } else {
                LinkOutcome::KeyOwnedByOtherAccount(*owner)
            });
        }

        let row = state
            .rows
            .get_mut(account_id)
            .ok_or_else(|| not_found(account_id))?;
        if let Some(existing) = row.links.get(key.provider) {
            return Ok(LinkOutcome::AccountHasOtherKey(existing.to_string()));
        }
        row.links.set(key);
        state.links.insert(key.clone(), *account_id);
        Ok(LinkOutcome::Linked)
    }

    async fn replace(
        &self,
        next: &AccountEntitlement,
        expected_version: i64,
        is_refund: bool,
    ) -> Result<WriteOutcome, DomainError> {
        let mut state = self.state.write().await;
        let stored = state
            .rows
            .get_mut(&next.account_id)
            .ok_or_else(|| not_found(&next.account_id))?;

        if stored.version != expected_version {
            return Ok(WriteOutcome::Conflict);
        }
        let regresses = match (stored.as_of, next.as_of) {
            (Some(stored_as_of), Some(next_as_of)) => next_as_of < stored_as_of,
            (Some(_), None) => true,
            _ => false,
        };
        if regresses && !is_refund {
            return Ok(WriteOutcome::Conflict);
        }

        let links = stored.links.clone();
        *stored = AccountEntitlement {
            links,
            version: stored.version + 1,
            ..next.clone()
        };
        Ok(WriteOutcome::Committed(stored.clone()))
    }

    async fn find_lapsed(&self, now: Timestamp, limit: u32) -> Result<Vec<AccountEntitlement>, DomainError> {
        let state = self.state.read().await;
        let mut lapsed: Vec<_> = state
            .rows
            .values()
            .filter(|e| e.has_lapsed(now))
            .cloned()
            .collect();
        lapsed.sort_by_key(|e| e.expires_at);
        lapsed.truncate(limit as usize);
        Ok(lapsed)
    }
}

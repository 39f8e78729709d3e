//! Entitlement store port.
//!
//! Persists one [`AccountEntitlement`] per account. Writes are conditional:
//! a replace only commits if nobody else committed since the caller read the
//! row, which makes the store the per-account serialization point without a
//! lock.
//!
//! # Example
//!
//! ```ignore
//! loop {
//!     let current = store.get(&account_id).await?.ok_or(NotFound)?;
//!     let next = reconciler.reconcile(&current, &event);
//!     match store.replace(&next, current.version, is_refund).await? {
//!         WriteOutcome::Committed(saved) => break saved,
//!         WriteOutcome::Conflict => continue, // re-read and re-reconcile
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::entitlement::{AccountEntitlement, LinkingKey};
use crate::domain::foundation::{AccountId, DomainError, Timestamp};

/// Result of a conditional replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; carries the stored row with its new version.
    Committed(AccountEntitlement),
    /// The version moved on, or the write would regress `as_of`.
    Conflict,
}

/// Result of attaching a linking key to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The key was attached.
    Linked,
    /// The account already holds exactly this key.
    AlreadyLinked,
    /// The account already holds a different key for this provider.
    AccountHasOtherKey(String),
    /// Another account already holds this key.
    KeyOwnedByOtherAccount(AccountId),
}

impl LinkOutcome {
    pub fn is_linked(&self) -> bool {
        matches!(self, LinkOutcome::Linked | LinkOutcome::AlreadyLinked)
    }
}

/// Port for entitlement persistence.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Point read by account.
    async fn get(&self, account_id: &AccountId) -> Result<Option<AccountEntitlement>, DomainError>;

    /// Inserts the `{Free, None}` baseline for a new account.
    ///
    /// # Errors
    ///
    /// - `AccountAlreadyExists` if the account has a row
    async fn create_baseline(&self, account_id: &AccountId) -> Result<AccountEntitlement, DomainError>;

    /// Resolves a provider linking key to the account that owns it.
    async fn find_by_linking_key(&self, key: &LinkingKey) -> Result<Option<AccountId>, DomainError>;

    /// Attaches `key` to `account_id` if the account has no key for that
    /// provider and no other account holds it. Does not bump `version`.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the account has no row
    async fn link(&self, account_id: &AccountId, key: &LinkingKey) -> Result<LinkOutcome, DomainError>;

    /// Replaces the billing fields of `next.account_id` if the stored version
    /// equals `expected_version` and, unless `is_refund`, the stored `as_of`
    /// is not newer than `next.as_of`. Links are never written here.
    async fn replace(
        &self,
        next: &AccountEntitlement,
        expected_version: i64,
        is_refund: bool,
    ) -> Result<WriteOutcome, DomainError>;

    /// Rows in a lapsing status whose `expires_at` is before `now`.
    async fn find_lapsed(&self, now: Timestamp, limit: u32) -> Result<Vec<AccountEntitlement>, DomainError>;
}

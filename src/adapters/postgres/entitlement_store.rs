//! PostgreSQL implementation of EntitlementStore.
//!
//! One row per account in `account_entitlements`. The conditional replace is
//! a single `UPDATE ... WHERE version = $n` statement, so concurrent writers
//! for the same account serialize on the row without an explicit lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entitlement::{
    AccountEntitlement, EntitlementStatus, LinkingKey, ProviderKind, ProviderLinks, Tier,
};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, EventId, Timestamp};
use crate::ports::{EntitlementStore, LinkOutcome, WriteOutcome};

const COLUMNS: &str = "account_id, tier, status, source_provider, product_ref, expires_at, \
     as_of, last_event_id, app_store_original_transaction_id, stripe_customer_id, version";

/// PostgreSQL implementation of the EntitlementStore port.
#[derive(Clone)]
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Migration failed: {}", e))
            })
    }

    async fn fetch_link(
        &self,
        account_id: &AccountId,
        provider: ProviderKind,
    ) -> Result<Option<Option<String>>, DomainError> {
        let query = format!(
            "SELECT {} FROM account_entitlements WHERE account_id = $1",
            link_column(provider)
        );
        let row: Option<(Option<String>,)> = sqlx::query_as(&query)
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read link", e))?;
        Ok(row.map(|(link,)| link))
    }
}

/// Database row representation of an account entitlement.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    account_id: Uuid,
    tier: String,
    status: String,
    source_provider: Option<String>,
    product_ref: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    as_of: Option<DateTime<Utc>>,
    last_event_id: Option<String>,
    app_store_original_transaction_id: Option<String>,
    stripe_customer_id: Option<String>,
    version: i64,
}

impl TryFrom<EntitlementRow> for AccountEntitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let tier = Tier::parse(&row.tier).ok_or_else(|| invalid_column("tier", &row.tier))?;
        let status = EntitlementStatus::parse(&row.status)
            .ok_or_else(|| invalid_column("status", &row.status))?;
        let source_provider = row
            .source_provider
            .as_deref()
            .map(|s| ProviderKind::parse(s).ok_or_else(|| invalid_column("source_provider", s)))
            .transpose()?;
        let last_event_id = row
            .last_event_id
            .map(|id| {
                EventId::new(id).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid last_event_id: {}", e))
                })
            })
            .transpose()?;

        Ok(AccountEntitlement {
            account_id: AccountId::from_uuid(row.account_id),
            tier,
            status,
            source_provider,
            product_ref: row.product_ref,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            as_of: row.as_of.map(Timestamp::from_datetime),
            last_event_id,
            links: ProviderLinks {
                app_store_original_transaction_id: row.app_store_original_transaction_id,
                stripe_customer_id: row.stripe_customer_id,
            },
            version: row.version,
        })
    }
}

fn invalid_column(column: &str, value: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn link_column(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::AppStore => "app_store_original_transaction_id",
        ProviderKind::Stripe => "stripe_customer_id",
    }
}

fn to_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<AccountEntitlement>, DomainError> {
        let query = format!(
            "SELECT {} FROM account_entitlements WHERE account_id = $1",
            COLUMNS
        );
        let row: Option<EntitlementRow> = sqlx::query_as(&query)
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to fetch entitlement", e))?;

        row.map(AccountEntitlement::try_from).transpose()
    }

    async fn create_baseline(&self, account_id: &AccountId) -> Result<AccountEntitlement, DomainError> {
        let query = format!(
            "INSERT INTO account_entitlements (account_id) VALUES ($1) RETURNING {}",
            COLUMNS
        );
        let row: EntitlementRow = sqlx::query_as(&query)
            .bind(account_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return DomainError::new(
                        ErrorCode::AccountAlreadyExists,
                        "Account entitlement already exists",
                    )
                    .with_detail("account_id", account_id.to_string());
                }
                db_error("Failed to create entitlement", e)
            })?;

        row.try_into()
    }

    async fn find_by_linking_key(&self, key: &LinkingKey) -> Result<Option<AccountId>, DomainError> {
        let query = format!(
            "SELECT account_id FROM account_entitlements WHERE {} = $1",
            link_column(key.provider)
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&query)
            .bind(&key.external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to resolve linking key", e))?;

        Ok(row.map(|(id,)| AccountId::from_uuid(id)))
    }

    async fn link(&self, account_id: &AccountId, key: &LinkingKey) -> Result<LinkOutcome, DomainError> {
        let column = link_column(key.provider);
        let query = format!(
            "UPDATE account_entitlements SET {col} = $2, updated_at = NOW() \
             WHERE account_id = $1 AND {col} IS NULL RETURNING account_id",
            col = column
        );
        let updated: Result<Option<(Uuid,)>, sqlx::Error> = sqlx::query_as(&query)
            .bind(account_id.as_uuid())
            .bind(&key.external_id)
            .fetch_optional(&self.pool)
            .await;

        match updated {
            Ok(Some(_)) => Ok(LinkOutcome::Linked),
            Ok(None) => match self.fetch_link(account_id, key.provider).await? {
                None => Err(DomainError::new(
                    ErrorCode::AccountNotFound,
                    "Account entitlement not found",
                )
                .with_detail("account_id", account_id.to_string())),
                Some(Some(existing)) if existing == key.external_id => Ok(LinkOutcome::AlreadyLinked),
                Some(Some(existing)) => Ok(LinkOutcome::AccountHasOtherKey(existing)),
                // Cleared between the update and the read; links are never
                // cleared, so treat as a contended write.
                Some(None) => Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    "Link column changed concurrently",
                )),
            },
            Err(e) if is_unique_violation(&e) => match self.find_by_linking_key(key).await? {
                Some(owner) => Ok(LinkOutcome::KeyOwnedByOtherAccount(owner)),
                None => Err(db_error("Failed to link account", e)),
            },
            Err(e) => Err(db_error("Failed to link account", e)),
        }
    }

    async fn replace(
        &self,
        next: &AccountEntitlement,
        expected_version: i64,
        is_refund: bool,
    ) -> Result<WriteOutcome, DomainError> {
        let query = format!(
            r#"
            UPDATE account_entitlements SET
                tier = $2,
                status = $3,
                source_provider = $4,
                product_ref = $5,
                expires_at = $6,
                as_of = $7,
                last_event_id = $8,
                version = version + 1,
                updated_at = NOW()
            WHERE account_id = $1
              AND version = $9
              AND ($10 OR as_of IS NULL OR as_of <= $7)
            RETURNING {}
            "#,
            COLUMNS
        );
        let row: Option<EntitlementRow> = sqlx::query_as(&query)
            .bind(next.account_id.as_uuid())
            .bind(next.tier.as_str())
            .bind(next.status.as_str())
            .bind(next.source_provider.map(|p| p.as_str()))
            .bind(&next.product_ref)
            .bind(to_datetime(next.expires_at))
            .bind(to_datetime(next.as_of))
            .bind(next.last_event_id.as_ref().map(|id| id.as_str()))
            .bind(expected_version)
            .bind(is_refund)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to replace entitlement", e))?;

        match row {
            Some(row) => Ok(WriteOutcome::Committed(row.try_into()?)),
            None => {
                if self.get(&next.account_id).await?.is_none() {
                    return Err(DomainError::new(
                        ErrorCode::AccountNotFound,
                        "Account entitlement not found",
                    )
                    .with_detail("account_id", next.account_id.to_string()));
                }
                Ok(WriteOutcome::Conflict)
            }
        }
    }

    async fn find_lapsed(&self, now: Timestamp, limit: u32) -> Result<Vec<AccountEntitlement>, DomainError> {
        let query = format!(
            "SELECT {} FROM account_entitlements \
             WHERE status IN ('grace_period', 'pending_expiry') AND expires_at < $1 \
             ORDER BY expires_at ASC LIMIT $2",
            COLUMNS
        );
        let rows: Vec<EntitlementRow> = sqlx::query_as(&query)
            .bind(now.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to query lapsed entitlements", e))?;

        rows.into_iter().map(AccountEntitlement::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EntitlementRow {
        EntitlementRow {
            account_id: Uuid::new_v4(),
            tier: "pro".into(),
            status: "pending_expiry".into(),
            source_provider: Some("stripe".into()),
            product_ref: Some("price_pro_monthly".into()),
            expires_at: Some(Utc::now()),
            as_of: Some(Utc::now()),
            last_event_id: Some("evt_1".into()),
            app_store_original_transaction_id: None,
            stripe_customer_id: Some("cus_1".into()),
            version: 4,
        }
    }

    #[test]
    fn row_converts_to_entitlement() {
        let entitlement = AccountEntitlement::try_from(row()).unwrap();

        assert_eq!(entitlement.tier, Tier::Pro);
        assert_eq!(entitlement.status, EntitlementStatus::PendingExpiry);
        assert_eq!(entitlement.source_provider, Some(ProviderKind::Stripe));
        assert_eq!(entitlement.links.get(ProviderKind::Stripe), Some("cus_1"));
        assert_eq!(entitlement.last_event_id.unwrap().as_str(), "evt_1");
        assert_eq!(entitlement.version, 4);
    }

    #[test]
    fn unknown_tier_is_database_error() {
        let mut bad = row();
        bad.tier = "platinum".into();

        let err = AccountEntitlement::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn unknown_provider_is_database_error() {
        let mut bad = row();
        bad.source_provider = Some("paypal".into());

        assert!(AccountEntitlement::try_from(bad).is_err());
    }

    #[test]
    fn link_columns_match_migration() {
        let migration = include_str!("../../../migrations/0001_account_entitlements.sql");
        for provider in [ProviderKind::AppStore, ProviderKind::Stripe] {
            assert!(migration.contains(link_column(provider)));
        }
    }
}

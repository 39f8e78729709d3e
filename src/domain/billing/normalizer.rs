//! Provider payload to canonical event normalization.
//!
//! Each provider has a static mapping table keyed by `(type, qualifier)`.
//! The qualifier is the App Store `subtype`, or for Stripe a refinement
//! derived from the event object (invoice `billing_reason`, or which attribute
//! of a subscription changed). Lookup tries the exact qualifier first and then
//! the type-wide row. Anything without a row is unmappable.
//!
//! Purchase kinds are keyed by the purchase they grant rather than by the
//! delivery, so the client-sync path and the provider's own notification for
//! the same transaction share one idempotency key.

use thiserror::Error;

use super::{
    AppStoreNotification, AppStoreRenewalInfo, AppStoreTransaction, StripeEvent, VerifiedPayload,
};
use crate::domain::entitlement::{CanonicalEvent, EventKind, LinkingKey, ProviderKind};
use crate::domain::foundation::{AccountId, EventId, Timestamp};

/// Errors that prevent a verified payload from becoming a canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// No table row for the provider's type string.
    #[error("Unmappable {provider} event type: {event_type}")]
    UnmappableEventType {
        provider: ProviderKind,
        event_type: String,
    },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

type MappingRow = (&'static str, Option<&'static str>, EventKind);

const APP_STORE_TABLE: &[MappingRow] = &[
    ("SUBSCRIBED", None, EventKind::Activated),
    ("DID_RENEW", None, EventKind::Renewed),
    ("OFFER_REDEEMED", None, EventKind::OfferRedeemed),
    ("DID_FAIL_TO_RENEW", Some("GRACE_PERIOD"), EventKind::EnteredGracePeriod),
    ("DID_CHANGE_RENEWAL_STATUS", Some("AUTO_RENEW_DISABLED"), EventKind::AutoRenewDisabled),
    ("DID_CHANGE_RENEWAL_STATUS", Some("AUTO_RENEW_ENABLED"), EventKind::AutoRenewEnabled),
    ("EXPIRED", None, EventKind::Expired),
    ("GRACE_PERIOD_EXPIRED", None, EventKind::Expired),
    ("REFUND", None, EventKind::Refunded),
    ("REVOKE", None, EventKind::Refunded),
    ("DID_CHANGE_RENEWAL_PREF", None, EventKind::RenewalInfoChanged),
    ("PRICE_INCREASE", None, EventKind::RenewalInfoChanged),
];

const STRIPE_TABLE: &[MappingRow] = &[
    ("checkout.session.completed", None, EventKind::Activated),
    ("invoice.paid", Some("subscription_create"), EventKind::Activated),
    ("invoice.paid", Some("subscription_cycle"), EventKind::Renewed),
    ("invoice.paid", Some("subscription_update"), EventKind::Renewed),
    ("invoice.payment_succeeded", Some("subscription_create"), EventKind::Activated),
    ("invoice.payment_succeeded", Some("subscription_cycle"), EventKind::Renewed),
    ("invoice.payment_succeeded", Some("subscription_update"), EventKind::Renewed),
    ("invoice.payment_failed", None, EventKind::EnteredGracePeriod),
    ("customer.subscription.updated", Some("auto_renew_disabled"), EventKind::AutoRenewDisabled),
    ("customer.subscription.updated", Some("auto_renew_enabled"), EventKind::AutoRenewEnabled),
    ("customer.subscription.updated", Some("past_due"), EventKind::EnteredGracePeriod),
    ("customer.subscription.updated", Some("reactivated"), EventKind::AutoRenewEnabled),
    ("customer.subscription.updated", Some("plan_changed"), EventKind::Activated),
    ("customer.subscription.updated", None, EventKind::RenewalInfoChanged),
    ("customer.subscription.deleted", None, EventKind::Expired),
    ("charge.refunded", None, EventKind::Refunded),
];

fn lookup(table: &[MappingRow], event_type: &str, qualifier: Option<&str>) -> Option<EventKind> {
    let exact = qualifier.and_then(|q| {
        table
            .iter()
            .find(|(t, sub, _)| *t == event_type && *sub == Some(q))
    });
    exact
        .or_else(|| table.iter().find(|(t, sub, _)| *t == event_type && sub.is_none()))
        .map(|(_, _, kind)| *kind)
}

/// Converts verified provider payloads into [`CanonicalEvent`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer;

impl EventNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, payload: &VerifiedPayload) -> Result<CanonicalEvent, NormalizeError> {
        match payload {
            VerifiedPayload::AppStoreNotification {
                event_id,
                notification,
                transaction,
                renewal,
            } => self.app_store_notification(
                event_id,
                notification,
                transaction.as_ref(),
                renewal.as_ref(),
            ),
            VerifiedPayload::AppStoreTransaction {
                event_id,
                transaction,
            } => self.app_store_transaction(event_id, transaction),
            VerifiedPayload::Stripe { event_id, event } => self.stripe(event_id, event),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // App Store
    // ════════════════════════════════════════════════════════════════════════════

    fn app_store_notification(
        &self,
        event_id: &EventId,
        notification: &AppStoreNotification,
        transaction: Option<&AppStoreTransaction>,
        renewal: Option<&AppStoreRenewalInfo>,
    ) -> Result<CanonicalEvent, NormalizeError> {
        let subtype = notification.subtype.as_deref();
        let kind = lookup(APP_STORE_TABLE, &notification.notification_type, subtype).ok_or_else(
            || NormalizeError::UnmappableEventType {
                provider: ProviderKind::AppStore,
                event_type: match subtype {
                    Some(sub) => format!("{}/{}", notification.notification_type, sub),
                    None => notification.notification_type.clone(),
                },
            },
        )?;

        let original_transaction_id = transaction
            .map(|t| t.original_transaction_id.clone())
            .or_else(|| renewal.map(|r| r.original_transaction_id.clone()))
            .ok_or(NormalizeError::MissingField("originalTransactionId"))?;

        let occurred_at = millis("signedDate", notification.signed_date)?;

        let period_end = match kind {
            EventKind::EnteredGracePeriod => renewal
                .and_then(AppStoreRenewalInfo::grace_period_expires_at)
                .or_else(|| transaction.and_then(AppStoreTransaction::expires_at)),
            _ => transaction.and_then(AppStoreTransaction::expires_at),
        };

        let event_id = match transaction {
            Some(t) if kind.is_purchase() => app_store_purchase_id(t),
            _ => event_id.clone(),
        };

        Ok(CanonicalEvent {
            provider_kind: ProviderKind::AppStore,
            kind,
            linking_key: LinkingKey::app_store(original_transaction_id),
            product_ref: transaction.map(|t| t.product_id.clone()),
            period_end,
            occurred_at,
            event_id,
            account_hint: transaction.and_then(|t| parse_account(t.app_account_token.as_deref())),
            lapsed_expiry: None,
        })
    }

    /// Classifies a transaction the client holds, which carries no
    /// notification type of its own.
    fn app_store_transaction(
        &self,
        event_id: &EventId,
        transaction: &AppStoreTransaction,
    ) -> Result<CanonicalEvent, NormalizeError> {
        let signed_at = millis("signedDate", transaction.signed_date)?;
        let expires_at = transaction.expires_at();

        let (kind, occurred_at) = if let Some(revoked) = transaction.revocation_date {
            (EventKind::Refunded, millis("revocationDate", revoked)?)
        } else if let Some(expires) = expires_at.filter(|e| e.is_before(&signed_at)) {
            (EventKind::Expired, expires)
        } else {
            let kind = if transaction.is_original() {
                EventKind::Activated
            } else {
                EventKind::Renewed
            };
            (kind, millis("purchaseDate", transaction.purchase_date)?)
        };

        let event_id = if kind.is_purchase() {
            app_store_purchase_id(transaction)
        } else {
            event_id.clone()
        };

        Ok(CanonicalEvent {
            provider_kind: ProviderKind::AppStore,
            kind,
            linking_key: LinkingKey::app_store(transaction.original_transaction_id.clone()),
            product_ref: Some(transaction.product_id.clone()),
            period_end: expires_at,
            occurred_at,
            event_id,
            account_hint: parse_account(transaction.app_account_token.as_deref()),
            lapsed_expiry: None,
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Stripe
    // ════════════════════════════════════════════════════════════════════════════

    fn stripe(&self, event_id: &EventId, event: &StripeEvent) -> Result<CanonicalEvent, NormalizeError> {
        let qualifier = stripe_qualifier(event);
        let kind = lookup(STRIPE_TABLE, &event.event_type, qualifier).ok_or_else(|| {
            NormalizeError::UnmappableEventType {
                provider: ProviderKind::Stripe,
                event_type: match qualifier {
                    Some(q) => format!("{}/{}", event.event_type, q),
                    None => event.event_type.clone(),
                },
            }
        })?;

        let customer = event
            .object_ref("customer")
            .ok_or(NormalizeError::MissingField("customer"))?;

        let occurred_at = Timestamp::from_unix_secs(event.created).ok_or_else(|| {
            NormalizeError::InvalidField {
                field: "created",
                reason: format!("out of range: {}", event.created),
            }
        })?;

        let product_ref = [
            "metadata.price_id",
            "items.data.0.price.id",
            "lines.data.0.price.id",
            "subscription.items.data.0.price.id",
            "plan.id",
        ]
        .iter()
        .find_map(|path| event.object_str(path))
        .map(str::to_string);

        // A failed charge already carries the next, unpaid period; grace keeps
        // the current expiry.
        let period_end = match kind {
            EventKind::EnteredGracePeriod => None,
            _ => [
                "current_period_end",
                "lines.data.0.period.end",
                "subscription.current_period_end",
            ]
            .iter()
            .find_map(|path| event.object_i64(path))
            .and_then(Timestamp::from_unix_secs),
        };

        let event_id = match (kind.is_purchase(), event.event_type.as_str(), event.object_str("id")) {
            (true, "checkout.session.completed", Some(session)) => {
                EventId::namespaced("stripe:checkout", session)
            }
            (true, "invoice.paid" | "invoice.payment_succeeded", Some(invoice)) => {
                EventId::namespaced("stripe:invoice", invoice)
            }
            _ => event_id.clone(),
        };

        let account_hint = parse_account(event.object_str("client_reference_id"))
            .or_else(|| parse_account(event.object_str("metadata.account_id")));

        Ok(CanonicalEvent {
            provider_kind: ProviderKind::Stripe,
            kind,
            linking_key: LinkingKey::stripe(customer),
            product_ref,
            period_end,
            occurred_at,
            event_id,
            account_hint,
            lapsed_expiry: None,
        })
    }
}

/// Idempotency key of an App Store purchase.
fn app_store_purchase_id(transaction: &AppStoreTransaction) -> EventId {
    EventId::namespaced("appstore:txn", &transaction.transaction_id)
}

/// Refines a Stripe event type where one type string covers several
/// canonical transitions.
fn stripe_qualifier(event: &StripeEvent) -> Option<&'static str> {
    match event.event_type.as_str() {
        "invoice.paid" | "invoice.payment_succeeded" => match event.object_str("billing_reason")? {
            "subscription_create" => Some("subscription_create"),
            "subscription_cycle" => Some("subscription_cycle"),
            "subscription_update" => Some("subscription_update"),
            _ => None,
        },
        "customer.subscription.updated" => {
            if event.changed("cancel_at_period_end") {
                return if event.object_bool("cancel_at_period_end") == Some(true) {
                    Some("auto_renew_disabled")
                } else {
                    Some("auto_renew_enabled")
                };
            }
            if event.changed("status") {
                return match (event.object_str("status"), event.previous_str("status")) {
                    (Some("past_due"), _) => Some("past_due"),
                    (Some("active"), Some("past_due" | "unpaid")) => Some("reactivated"),
                    _ => None,
                };
            }
            if event.changed("items") || event.changed("plan") {
                return Some("plan_changed");
            }
            None
        }
        _ => None,
    }
}

fn millis(field: &'static str, value: i64) -> Result<Timestamp, NormalizeError> {
    Timestamp::from_unix_millis(value).ok_or_else(|| NormalizeError::InvalidField {
        field,
        reason: format!("out of range: {}", value),
    })
}

fn parse_account(raw: Option<&str>) -> Option<AccountId> {
    raw.and_then(|s| s.parse().ok())
}

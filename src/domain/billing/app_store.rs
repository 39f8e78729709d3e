//! App Store Server Notification payloads (version 2).
//!
//! These are the decoded claims of the signed JWS envelopes. Dates are Unix
//! milliseconds, as Apple sends them.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Decoded `signedPayload` of a server notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreNotification {
    pub notification_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(rename = "notificationUUID", default)]
    pub notification_uuid: Option<String>,
    pub signed_date: i64,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub data: Option<AppStoreNotificationData>,
}

/// The `data` object of a notification, holding the nested JWS strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreNotificationData {
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub signed_transaction_info: Option<String>,
    #[serde(default)]
    pub signed_renewal_info: Option<String>,
}

/// Decoded `signedTransactionInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreTransaction {
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub product_id: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
    pub purchase_date: i64,
    #[serde(default)]
    pub expires_date: Option<i64>,
    #[serde(default)]
    pub revocation_date: Option<i64>,
    #[serde(default)]
    pub app_account_token: Option<String>,
    pub signed_date: i64,
}

impl AppStoreTransaction {
    pub fn purchased_at(&self) -> Option<Timestamp> {
        Timestamp::from_unix_millis(self.purchase_date)
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_date.and_then(Timestamp::from_unix_millis)
    }

    pub fn signed_at(&self) -> Option<Timestamp> {
        Timestamp::from_unix_millis(self.signed_date)
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    /// First transaction of a subscription chain.
    pub fn is_original(&self) -> bool {
        self.transaction_id == self.original_transaction_id
    }
}

/// Decoded `signedRenewalInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStoreRenewalInfo {
    pub original_transaction_id: String,
    #[serde(default)]
    pub auto_renew_product_id: Option<String>,
    #[serde(default)]
    pub auto_renew_status: Option<i32>,
    #[serde(default)]
    pub grace_period_expires_date: Option<i64>,
    #[serde(default)]
    pub signed_date: Option<i64>,
}

impl AppStoreRenewalInfo {
    pub fn grace_period_expires_at(&self) -> Option<Timestamp> {
        self.grace_period_expires_date
            .and_then(Timestamp::from_unix_millis)
    }
}

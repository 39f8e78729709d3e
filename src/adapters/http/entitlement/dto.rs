//! HTTP DTOs (Data Transfer Objects) for entitlement endpoints.
//!
//! These types define the JSON request/response structure for the entitlement API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{CheckAccessResult, GetEntitlementResult, RunExpirySweepResult};
use crate::domain::entitlement::{
    AccessResult, AccountEntitlement, DenialReason, EntitlementStatus, ProviderKind, Tier,
    TierLimits,
};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to sync a purchase the client just completed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntitlementRequest {
    /// `app_store` or `stripe`.
    pub provider_kind: ProviderKind,
    /// Signed transaction (App Store) or checkout session id (Stripe).
    pub receipt: String,
}

/// Redirect targets after a hosted checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct ReturnUrls {
    pub success: String,
    pub cancel: String,
}

/// Request to start a web checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    /// Stripe price id.
    pub product_ref: String,
    pub return_urls: ReturnUrls,
}

/// Request to open the billing portal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortalRequest {
    pub return_url: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Current entitlement of the calling account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    pub tier: Tier,
    pub status: EntitlementStatus,
    /// End of the paid period (ISO 8601), if any.
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_provider: Option<ProviderKind>,
    /// Present on `GET /entitlement`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<TierLimitsResponse>,
}

impl From<AccountEntitlement> for EntitlementResponse {
    fn from(e: AccountEntitlement) -> Self {
        Self {
            tier: e.tier,
            status: e.status,
            expires_at: e.expires_at.map(|t| t.as_datetime().to_rfc3339()),
            source_provider: e.source_provider,
            limits: None,
        }
    }
}

impl From<GetEntitlementResult> for EntitlementResponse {
    fn from(result: GetEntitlementResult) -> Self {
        Self {
            limits: Some(TierLimitsResponse::from(result.limits)),
            ..Self::from(result.entitlement)
        }
    }
}

/// Tier limits for API response. `null` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimitsResponse {
    pub max_projects: Option<u32>,
    pub max_feedback_per_project: Option<u32>,
    pub can_invite_members: bool,
    pub has_integrations: bool,
}

impl From<TierLimits> for TierLimitsResponse {
    fn from(limits: TierLimits) -> Self {
        Self {
            max_projects: limits.max_projects,
            max_feedback_per_project: limits.max_feedback_per_project,
            can_invite_members: limits.can_invite_members,
            has_integrations: limits.has_integrations,
        }
    }
}

/// Result of a feature access check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub tier: Tier,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_to: Option<Tier>,
}

impl From<CheckAccessResult> for AccessCheckResponse {
    fn from(result: CheckAccessResult) -> Self {
        let (reason, upgrade_to) = match result.access {
            AccessResult::Allowed => (None, None),
            AccessResult::Denied { reason, upgrade_to } => (Some(reason), upgrade_to),
        };
        Self {
            tier: result.tier,
            allowed: result.access.is_allowed(),
            reason,
            upgrade_to,
        }
    }
}

/// Response for checkout initiation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

/// Response for billing portal URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Counts from one expiry sweep pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExpirySweepResponse {
    pub examined: u32,
    pub expired: u32,
}

impl From<RunExpirySweepResult> for ExpirySweepResponse {
    fn from(result: RunExpirySweepResult) -> Self {
        Self {
            examined: result.examined,
            expired: result.expired,
        }
    }
}

/// Webhook acknowledgement. Any 2xx stops provider redelivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Present when the client may retry the same request.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AccountId, Timestamp};

    #[test]
    fn sync_request_uses_camel_case() {
        let json = r#"{"providerKind": "app_store", "receipt": "eyJ..."}"#;
        let request: SyncEntitlementRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.provider_kind, ProviderKind::AppStore);
        assert_eq!(request.receipt, "eyJ...");
    }

    #[test]
    fn checkout_request_nests_return_urls() {
        let json = r#"{
            "productRef": "price_pro_monthly",
            "returnUrls": {"success": "https://app/ok", "cancel": "https://app/no"}
        }"#;
        let request: CreateCheckoutRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.product_ref, "price_pro_monthly");
        assert_eq!(request.return_urls.cancel, "https://app/no");
    }

    #[test]
    fn entitlement_response_serializes_expected_fields() {
        let mut e = AccountEntitlement::baseline(AccountId::new());
        e.tier = Tier::Pro;
        e.status = EntitlementStatus::GracePeriod;
        e.expires_at = Timestamp::from_unix_secs(1_700_000_000);

        let json = serde_json::to_value(EntitlementResponse::from(e)).unwrap();

        assert_eq!(json["tier"], "pro");
        assert_eq!(json["status"], "grace_period");
        assert_eq!(json["expiresAt"], "2023-11-14T22:13:20+00:00");
        assert!(json.get("limits").is_none());
    }

    #[test]
    fn baseline_has_null_expiry() {
        let json = serde_json::to_value(EntitlementResponse::from(AccountEntitlement::baseline(
            AccountId::new(),
        )))
        .unwrap();
        assert!(json["expiresAt"].is_null());
        assert_eq!(json["status"], "none");
    }

    #[test]
    fn limits_use_null_for_unlimited() {
        let json = serde_json::to_value(TierLimitsResponse::from(TierLimits::for_tier(Tier::Team)))
            .unwrap();
        assert!(json["maxProjects"].is_null());
        assert_eq!(json["canInviteMembers"], true);
    }

    #[test]
    fn error_response_omits_retryable_when_false() {
        let json = serde_json::to_string(&ErrorResponse::new("NOT_FOUND", "Not found")).unwrap();
        assert!(!json.contains("retryable"));

        let json = serde_json::to_string(&ErrorResponse::new("X", "y").retryable(true)).unwrap();
        assert!(json.contains("\"retryable\":true"));
    }
}

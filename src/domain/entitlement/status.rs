//! Entitlement status values.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an account's entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// No subscription has ever been applied, or it was refunded.
    None,

    /// Paid and renewing.
    Active,

    /// Renewal failed; access retained until the grace window closes.
    GracePeriod,

    /// Auto-renew turned off; access retained until `expires_at`.
    PendingExpiry,

    /// Subscription ended. Tier is always Free.
    Expired,
}

impl EntitlementStatus {
    /// Statuses the expiry sweep considers once `expires_at` has passed.
    pub fn is_lapsing(&self) -> bool {
        matches!(
            self,
            EntitlementStatus::GracePeriod | EntitlementStatus::PendingExpiry
        )
    }

    /// Stable snake_case name, used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::None => "none",
            EntitlementStatus::Active => "active",
            EntitlementStatus::GracePeriod => "grace_period",
            EntitlementStatus::PendingExpiry => "pending_expiry",
            EntitlementStatus::Expired => "expired",
        }
    }

    /// Parses the stable snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(EntitlementStatus::None),
            "active" => Some(EntitlementStatus::Active),
            "grace_period" => Some(EntitlementStatus::GracePeriod),
            "pending_expiry" => Some(EntitlementStatus::PendingExpiry),
            "expired" => Some(EntitlementStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_grace_and_pending_expiry_are_lapsing() {
        assert!(EntitlementStatus::GracePeriod.is_lapsing());
        assert!(EntitlementStatus::PendingExpiry.is_lapsing());
        assert!(!EntitlementStatus::Active.is_lapsing());
        assert!(!EntitlementStatus::None.is_lapsing());
        assert!(!EntitlementStatus::Expired.is_lapsing());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&EntitlementStatus::PendingExpiry).unwrap();
        assert_eq!(json, "\"pending_expiry\"");
    }

    #[test]
    fn parse_roundtrips_names() {
        for status in [
            EntitlementStatus::None,
            EntitlementStatus::Active,
            EntitlementStatus::GracePeriod,
            EntitlementStatus::PendingExpiry,
            EntitlementStatus::Expired,
        ] {
            assert_eq!(EntitlementStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EntitlementStatus::parse("cancelled"), None);
    }
}

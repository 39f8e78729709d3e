//! Tier-based feature limits and access checks.
//!
//! Every feature gate in the product goes through this module, and every
//! value here is a function of the tier alone.

use serde::{Deserialize, Serialize};

use super::Tier;

/// Feature limits for a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub tier: Tier,
    /// Maximum projects. None = unlimited.
    pub max_projects: Option<u32>,
    /// Maximum feedback items per project. None = unlimited.
    pub max_feedback_per_project: Option<u32>,
    pub can_invite_members: bool,
    pub has_integrations: bool,
}

impl TierLimits {
    /// Get the limits for a specific tier.
    ///
    /// | Tier | Projects | Feedback/Project | Invites | Integrations |
    /// |------|----------|------------------|---------|--------------|
    /// | Free | 1 | 50 | No | No |
    /// | Pro | 10 | Unlimited | No | Yes |
    /// | Team | Unlimited | Unlimited | Yes | Yes |
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                tier,
                max_projects: Some(1),
                max_feedback_per_project: Some(50),
                can_invite_members: false,
                has_integrations: false,
            },
            Tier::Pro => Self {
                tier,
                max_projects: Some(10),
                max_feedback_per_project: None,
                can_invite_members: false,
                has_integrations: true,
            },
            Tier::Team => Self {
                tier,
                max_projects: None,
                max_feedback_per_project: None,
                can_invite_members: true,
                has_integrations: true,
            },
        }
    }

    /// Returns false if unlimited or under limit.
    pub fn project_limit_reached(&self, current_projects: u32) -> bool {
        self.max_projects
            .map(|max| current_projects >= max)
            .unwrap_or(false)
    }

    /// Returns false if unlimited or under limit.
    pub fn feedback_limit_reached(&self, current_feedback: u32) -> bool {
        self.max_feedback_per_project
            .map(|max| current_feedback >= max)
            .unwrap_or(false)
    }
}

/// A gated capability, with the usage count where the gate is a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum Feature {
    CreateProject { current_projects: u32 },
    SubmitFeedback { current_feedback: u32 },
    InviteMember,
    UseIntegrations,
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    ProjectLimitReached,
    FeedbackLimitReached,
    TierTooLow,
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AccessResult {
    Allowed,
    Denied {
        reason: DenialReason,
        /// Lowest tier that would allow the request.
        upgrade_to: Option<Tier>,
    },
}

impl AccessResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessResult::Allowed)
    }
}

/// Pure access predicates over a tier.
pub struct AccessGate;

impl AccessGate {
    /// Returns true if `tier` satisfies `required`.
    pub fn meets_requirement(tier: Tier, required: Tier) -> bool {
        tier.meets_requirement(required)
    }

    pub fn limits(tier: Tier) -> TierLimits {
        TierLimits::for_tier(tier)
    }

    /// Checks whether `tier` may use `feature`.
    pub fn check(tier: Tier, feature: Feature) -> AccessResult {
        match Self::evaluate(&TierLimits::for_tier(tier), feature) {
            Ok(()) => AccessResult::Allowed,
            Err(reason) => AccessResult::Denied {
                reason,
                upgrade_to: [Tier::Pro, Tier::Team].into_iter().find(|t| {
                    *t > tier && Self::evaluate(&TierLimits::for_tier(*t), feature).is_ok()
                }),
            },
        }
    }

    fn evaluate(limits: &TierLimits, feature: Feature) -> Result<(), DenialReason> {
        let denied = match feature {
            Feature::CreateProject { current_projects } => limits
                .project_limit_reached(current_projects)
                .then_some(DenialReason::ProjectLimitReached),
            Feature::SubmitFeedback { current_feedback } => limits
                .feedback_limit_reached(current_feedback)
                .then_some(DenialReason::FeedbackLimitReached),
            Feature::InviteMember => {
                (!limits.can_invite_members).then_some(DenialReason::TierTooLow)
            }
            Feature::UseIntegrations => {
                (!limits.has_integrations).then_some(DenialReason::TierTooLow)
            }
        };
        denied.map_or(Ok(()), Err)
    }
}

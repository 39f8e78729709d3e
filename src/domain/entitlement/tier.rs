//! Subscription tier definitions.

use serde::{Deserialize, Serialize};

/// Canonical subscription tier.
///
/// Variants are declared in ascending order so the derived `Ord` is the
/// product's total order `Free < Pro < Team`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Default tier for every account.
    Free,
    /// Single-seat paid tier.
    Pro,
    /// Multi-seat paid tier.
    Team,
}

impl Tier {
    /// Returns true if this tier grants at least the access of `required`.
    pub fn meets_requirement(&self, required: Tier) -> bool {
        *self >= required
    }

    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Stable lowercase name, used for storage and wire formats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Team => "team",
        }
    }

    /// Parses the stable lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            "team" => Some(Tier::Team),
            _ => None,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Product reference to tier mapping.
//!
//! Each provider has its own table. A product id known to one provider is
//! never looked up in the other's table, so identical ids on both
//! platforms cannot cross-match.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ProviderKind, Tier};

/// Built-in App Store product ids.
static APP_STORE_PRODUCTS: Lazy<HashMap<String, Tier>> = Lazy::new(|| {
    [
        ("pro-monthly", Tier::Pro),
        ("pro-yearly", Tier::Pro),
        ("team-monthly", Tier::Team),
        ("team-yearly", Tier::Team),
    ]
    .into_iter()
    .map(|(id, tier)| (id.to_string(), tier))
    .collect()
});

/// Built-in Stripe price ids.
static STRIPE_PRICES: Lazy<HashMap<String, Tier>> = Lazy::new(|| {
    [
        ("price_pro_monthly", Tier::Pro),
        ("price_pro_yearly", Tier::Pro),
        ("price_team_monthly", Tier::Team),
        ("price_team_yearly", Tier::Team),
    ]
    .into_iter()
    .map(|(id, tier)| (id.to_string(), tier))
    .collect()
});

/// Per-provider product tables, as loaded from a catalog file.
///
/// ```yaml
/// app_store:
///   pro-monthly: pro
/// stripe:
///   price_pro_monthly: pro
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub app_store: HashMap<String, Tier>,
    #[serde(default)]
    pub stripe: HashMap<String, Tier>,
}

impl ProductCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            app_store: APP_STORE_PRODUCTS.clone(),
            stripe: STRIPE_PRICES.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.app_store.is_empty() && self.stripe.is_empty()
    }
}

/// Resolves provider product references to canonical tiers.
#[derive(Debug, Clone)]
pub struct TierResolver {
    catalog: ProductCatalog,
}

impl TierResolver {
    pub fn new(catalog: ProductCatalog) -> Self {
        Self { catalog }
    }

    /// Returns the tier for `product_ref`, or None when the provider's table
    /// does not know it.
    pub fn resolve(&self, provider: ProviderKind, product_ref: &str) -> Option<Tier> {
        let table = match provider {
            ProviderKind::AppStore => &self.catalog.app_store,
            ProviderKind::Stripe => &self.catalog.stripe,
        };
        table.get(product_ref).copied()
    }

    /// Returns true if `product_ref` is sold through `provider`.
    pub fn is_known(&self, provider: ProviderKind, product_ref: &str) -> bool {
        self.resolve(provider, product_ref).is_some()
    }
}

impl Default for TierResolver {
    fn default() -> Self {
        Self::new(ProductCatalog::builtin())
    }
}

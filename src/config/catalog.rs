//! Product catalog configuration

use serde::Deserialize;

use super::error::ConfigError;
use crate::domain::entitlement::ProductCatalog;

/// Where the product-to-tier tables come from
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// YAML catalog file. The built-in catalog is used when unset.
    pub path: Option<String>,
}

impl CatalogConfig {
    /// Load the configured catalog.
    ///
    /// A file that parses to an empty catalog is an error, since every
    /// purchase would then resolve to no tier.
    pub fn load(&self) -> Result<ProductCatalog, ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(ProductCatalog::builtin());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
            path: path.to_string(),
            source,
        })?;
        let catalog: ProductCatalog =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::CatalogParse {
                path: path.to_string(),
                source,
            })?;

        if catalog.is_empty() {
            return Err(ConfigError::EmptyCatalog(path.to_string()));
        }

        tracing::info!(
            path,
            app_store_products = catalog.app_store.len(),
            stripe_products = catalog.stripe.len(),
            "Loaded product catalog"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::Tier;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_catalog(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_unset_path_uses_builtin() {
        let catalog = CatalogConfig::default().load().unwrap();
        assert_eq!(catalog, ProductCatalog::builtin());
    }

    #[test]
    fn test_loads_yaml_file() {
        let file = write_catalog(
            "app_store:\n  com.acme.pro.monthly: pro\nstripe:\n  price_123: team\n",
        );
        let config = CatalogConfig {
            path: Some(file.path().to_string_lossy().into_owned()),
        };

        let catalog = config.load().unwrap();

        assert_eq!(catalog.app_store.get("com.acme.pro.monthly"), Some(&Tier::Pro));
        assert_eq!(catalog.stripe.get("price_123"), Some(&Tier::Team));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let config = CatalogConfig {
            path: Some("/nonexistent/catalog.yaml".to_string()),
        };
        assert!(matches!(config.load(), Err(ConfigError::CatalogRead { .. })));
    }

    #[test]
    fn test_unknown_tier_is_parse_error() {
        let file = write_catalog("stripe:\n  price_123: platinum\n");
        let config = CatalogConfig {
            path: Some(file.path().to_string_lossy().into_owned()),
        };
        assert!(matches!(config.load(), Err(ConfigError::CatalogParse { .. })));
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        let file = write_catalog("app_store: {}\n");
        let config = CatalogConfig {
            path: Some(file.path().to_string_lossy().into_owned()),
        };
        assert!(matches!(config.load(), Err(ConfigError::EmptyCatalog(_))));
    }
}

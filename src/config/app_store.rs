//! App Store configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::app_store::{DEFAULT_KEY_TTL, DEFAULT_MIN_REFRESH_INTERVAL};

/// App Store signed-payload verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppStoreConfig {
    /// JWK set URL for the notification signing keys
    pub keys_url: String,

    /// SHA-256 of the pinned root certificate DER, hex encoded
    pub root_fingerprint: String,

    /// Bundle id the payloads must name
    pub bundle_id: String,

    /// How long fetched keys are trusted
    #[serde(default = "default_key_ttl")]
    pub key_ttl_secs: u64,

    /// Floor between forced refreshes on an unknown key id
    #[serde(default = "default_min_refresh")]
    pub min_refresh_secs: u64,
}

impl AppStoreConfig {
    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_secs)
    }

    /// Validate App Store configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.keys_url.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE__KEYS_URL"));
        }
        if self.bundle_id.is_empty() {
            return Err(ValidationError::MissingRequired("APP_STORE__BUNDLE_ID"));
        }
        if *environment == Environment::Production && !self.keys_url.starts_with("https://") {
            return Err(ValidationError::KeysUrlMustBeHttps);
        }

        let hex: String = self
            .root_fingerprint
            .chars()
            .filter(|c| *c != ':')
            .collect();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidRootFingerprint);
        }

        if self.key_ttl_secs == 0 || self.min_refresh_secs > self.key_ttl_secs {
            return Err(ValidationError::OutOfRange("APP_STORE__KEY_TTL_SECS"));
        }
        Ok(())
    }
}

fn default_key_ttl() -> u64 {
    DEFAULT_KEY_TTL.as_secs()
}

fn default_min_refresh() -> u64 {
    DEFAULT_MIN_REFRESH_INTERVAL.as_secs()
}

#[cfg(test)]
pub(crate) fn test_app_store_config() -> AppStoreConfig {
    AppStoreConfig {
        keys_url: "https://keys.example.com/jwks.json".to_string(),
        root_fingerprint: "ab".repeat(32),
        bundle_id: "com.acme.feedback".to_string(),
        key_ttl_secs: default_key_ttl(),
        min_refresh_secs: default_min_refresh(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(test_app_store_config()
            .validate(&Environment::Production)
            .is_ok());
    }

    #[test]
    fn test_fingerprint_accepts_colon_separated_form() {
        let colon_form = vec!["AB"; 32].join(":");
        let config = AppStoreConfig {
            root_fingerprint: colon_form,
            ..test_app_store_config()
        };
        assert!(config.validate(&Environment::Development).is_ok());
    }

    #[test]
    fn test_short_fingerprint_is_rejected() {
        let config = AppStoreConfig {
            root_fingerprint: "abcd".to_string(),
            ..test_app_store_config()
        };
        assert_eq!(
            config.validate(&Environment::Development),
            Err(ValidationError::InvalidRootFingerprint)
        );
    }

    #[test]
    fn test_http_keys_url_only_outside_production() {
        let config = AppStoreConfig {
            keys_url: "http://localhost:9000/jwks.json".to_string(),
            ..test_app_store_config()
        };
        assert!(config.validate(&Environment::Development).is_ok());
        assert_eq!(
            config.validate(&Environment::Production),
            Err(ValidationError::KeysUrlMustBeHttps)
        );
    }

    #[test]
    fn test_refresh_floor_cannot_exceed_ttl() {
        let config = AppStoreConfig {
            key_ttl_secs: 10,
            min_refresh_secs: 60,
            ..test_app_store_config()
        };
        assert!(config.validate(&Environment::Development).is_err());
    }

    #[test]
    fn test_durations() {
        let config = test_app_store_config();
        assert_eq!(config.key_ttl(), DEFAULT_KEY_TTL);
        assert_eq!(config.min_refresh_interval(), DEFAULT_MIN_REFRESH_INTERVAL);
    }
}

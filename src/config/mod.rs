//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `ENTITLEMENT_SYNC`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use entitlement_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod app_store;
mod catalog;
mod database;
mod error;
mod reconciliation;
mod redis;
mod server;
mod stripe;

pub use app_store::AppStoreConfig;
pub use catalog::CatalogConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use reconciliation::ReconciliationConfig;
pub use redis::RedisConfig;
pub use server::{Environment, LogFormat, ServerConfig};
pub use stripe::StripeSettings;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener, logging and internal auth
    pub server: ServerConfig,

    /// Entitlement store (PostgreSQL)
    pub database: DatabaseConfig,

    /// Processed-event ledger (Redis)
    pub redis: RedisConfig,

    /// Stripe API and webhooks
    pub stripe: StripeSettings,

    /// App Store signed payloads
    pub app_store: AppStoreConfig,

    /// Product to tier tables
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Write retries and expiry sweep
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then reads `ENTITLEMENT_SYNC__*` variables.
    ///
    /// # Environment Variable Format
    ///
    /// - `ENTITLEMENT_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ENTITLEMENT_SYNC__STRIPE__API_KEY=...` -> `stripe.api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// cannot be parsed into its expected type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ENTITLEMENT_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let environment = &self.server.environment;
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.stripe.validate(environment)?;
        self.app_store.validate(environment)?;
        self.reconciliation.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

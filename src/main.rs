//! entitlement-sync server binary.
//!
//! Loads configuration, wires the PostgreSQL store, the Redis dedup ledger
//! and the provider adapters into the axum application, then serves until
//! ctrl-c.

use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use entitlement_sync::adapters::app_store::{AppStoreJwsVerifier, HttpKeySource, KeyCache};
use entitlement_sync::adapters::dedup::RedisProcessedEventStore;
use entitlement_sync::adapters::http::entitlement::{
    build_app, EntitlementAppState, ReconciliationSettings,
};
use entitlement_sync::adapters::postgres::PostgresEntitlementStore;
use entitlement_sync::adapters::stripe::{
    StripeConfig, StripePaymentAdapter, StripeWebhookVerifier,
};
use entitlement_sync::config::{AppConfig, ConfigError, LogFormat, ServerConfig, ValidationError};
use entitlement_sync::domain::entitlement::TierResolver;
use entitlement_sync::domain::foundation::DomainError;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] DomainError),

    #[error("Redis connection failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection timed out")]
    RedisTimeout,

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let addr = config.server.socket_addr()?;
    let state = build_state(&config).await?;
    let app = build_app(state, config.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        "entitlement-sync listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("entitlement-sync stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json, pretty) = match server.log_format() {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

async fn build_state(config: &AppConfig) -> Result<EntitlementAppState, StartupError> {
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    let store = PostgresEntitlementStore::new(pool);
    if config.database.run_migrations {
        store.migrate().await?;
        tracing::info!("Entitlement schema is up to date");
    }

    let redis = redis::Client::open(config.redis.url.as_str())?;
    let conn = tokio::time::timeout(
        config.redis.timeout(),
        redis.get_multiplexed_tokio_connection(),
    )
    .await
    .map_err(|_| StartupError::RedisTimeout)??;
    let processed_events = RedisProcessedEventStore::new(conn, config.redis.dedup_retention());

    let http_client = reqwest::Client::builder()
        .timeout(config.server.request_timeout())
        .build()?;

    let key_source = HttpKeySource::new(http_client.clone(), config.app_store.keys_url.clone());
    let keys = KeyCache::new(Arc::new(key_source), config.app_store.key_ttl())
        .with_min_refresh_interval(config.app_store.min_refresh_interval());
    let app_store = Arc::new(AppStoreJwsVerifier::new(
        keys,
        &config.app_store.root_fingerprint,
        config.app_store.bundle_id.clone(),
    ));

    let stripe_webhooks = StripeWebhookVerifier::new(config.stripe.webhook_secret.clone())
        .with_require_livemode(config.stripe.require_livemode);
    let stripe = Arc::new(StripePaymentAdapter::new(
        StripeConfig::new(config.stripe.api_key.clone()).with_base_url(&config.stripe.api_base),
        http_client,
    ));

    let catalog = config.catalog.load()?;

    Ok(EntitlementAppState {
        store: Arc::new(store),
        processed_events: Arc::new(processed_events),
        app_store_notifications: app_store.clone(),
        stripe_notifications: Arc::new(stripe_webhooks),
        app_store_receipts: app_store,
        stripe_receipts: stripe.clone(),
        payment_provider: stripe,
        tier_resolver: TierResolver::new(catalog),
        internal_token: Arc::new(SecretString::clone(&config.server.internal_token)),
        settings: ReconciliationSettings {
            max_write_attempts: config.reconciliation.max_write_attempts,
            sweep_batch_size: config.reconciliation.sweep_batch_size,
            sweep_concurrency: config.reconciliation.sweep_concurrency,
        },
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Where the App Store signing-key set comes from.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::VerificationError;

/// Fetches the provider's current JWKS.
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, VerificationError>;
}

/// Fetches the JWKS over HTTPS.
pub struct HttpKeySource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SigningKeySource for HttpKeySource {
    async fn fetch(&self) -> Result<JwkSet, VerificationError> {
        tracing::debug!(url = %self.url, "Fetching App Store signing keys");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch signing keys");
                VerificationError::SourceUnavailable(format!("Failed to fetch JWKS: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, "Signing key endpoint returned an error");
            return Err(VerificationError::SourceUnavailable(format!(
                "JWKS endpoint returned {}",
                status
            )));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            VerificationError::SourceUnavailable(format!("Failed to parse JWKS: {}", e))
        })?;

        tracing::debug!(keys = jwks.keys.len(), "Fetched signing keys");
        Ok(jwks)
    }
}

/// Serves a fixed key set that can be swapped at runtime.
///
/// Used for local development and tests; also counts fetches and can be
/// switched into a failing state.
#[derive(Clone)]
pub struct StaticKeySource {
    keys: Arc<RwLock<Option<JwkSet>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticKeySource {
    pub fn new(keys: JwkSet) -> Self {
        Self {
            keys: Arc::new(RwLock::new(Some(keys))),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the served key set.
    pub async fn set_keys(&self, keys: JwkSet) {
        *self.keys.write().await = Some(keys);
    }

    /// Makes every subsequent fetch fail as if the endpoint were down.
    pub async fn make_unavailable(&self) {
        *self.keys.write().await = None;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningKeySource for StaticKeySource {
    async fn fetch(&self) -> Result<JwkSet, VerificationError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.keys
            .read()
            .await
            .clone()
            .ok_or_else(|| VerificationError::SourceUnavailable("key source offline".into()))
    }
}

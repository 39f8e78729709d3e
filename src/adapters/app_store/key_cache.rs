//! TTL cache over the App Store signing-key set.
//!
//! Reads are served from memory. After the TTL passes, callers keep getting
//! the stale set while a single background task refreshes it. A `kid` that is
//! not in the cached set forces one synchronous refresh, at most once per
//! `min_refresh_interval`. Only a cold cache whose source is down fails with
//! `SourceUnavailable`.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::key_source::SigningKeySource;
use crate::domain::billing::VerificationError;

/// Default time a fetched key set is considered fresh.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// Minimum spacing between refreshes forced by an unknown `kid`.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct CachedKeys {
    jwks: Arc<JwkSet>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    cached: Option<CachedKeys>,
    last_forced_refresh: Option<Instant>,
}

/// Shared, cloneable signing-key cache.
#[derive(Clone)]
pub struct KeyCache {
    source: Arc<dyn SigningKeySource>,
    ttl: Duration,
    min_refresh_interval: Duration,
    state: Arc<RwLock<CacheState>>,
    refreshing: Arc<AtomicBool>,
}

impl KeyCache {
    pub fn new(source: Arc<dyn SigningKeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            state: Arc::new(RwLock::new(CacheState::default())),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Returns the key for `kid`.
    pub async fn get(&self, kid: &str) -> Result<Jwk, VerificationError> {
        let (jwks, stale) = {
            let state = self.state.read().await;
            match &state.cached {
                Some(cached) => (
                    Some(cached.jwks.clone()),
                    cached.fetched_at.elapsed() >= self.ttl,
                ),
                None => (None, false),
            }
        };

        let Some(jwks) = jwks else {
            let jwks = self.refresh_now().await?;
            return find(&jwks, kid);
        };

        if stale {
            self.spawn_refresh();
        }

        if let Some(key) = jwks.find(kid) {
            return Ok(key.clone());
        }

        if !self.claim_forced_refresh().await {
            tracing::warn!(kid, "Unknown key id; forced refresh suppressed");
            return Err(VerificationError::UnknownKeyId(kid.to_string()));
        }

        tracing::info!(kid, "Unknown key id; refreshing signing keys");
        let jwks = self.refresh_now().await?;
        find(&jwks, kid)
    }

    async fn refresh_now(&self) -> Result<Arc<JwkSet>, VerificationError> {
        let jwks = Arc::new(self.source.fetch().await?);
        let mut state = self.state.write().await;
        state.cached = Some(CachedKeys {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    async fn claim_forced_refresh(&self) -> bool {
        let mut state = self.state.write().await;
        let allowed = state
            .last_forced_refresh
            .map(|at| at.elapsed() >= self.min_refresh_interval)
            .unwrap_or(true);
        if allowed {
            state.last_forced_refresh = Some(Instant::now());
        }
        allowed
    }

    fn spawn_refresh(&self) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.refresh_now().await {
                tracing::warn!(error = %e, "Background signing key refresh failed; serving stale keys");
            }
            cache.refreshing.store(false, Ordering::Release);
        });
    }
}

fn find(jwks: &JwkSet, kid: &str) -> Result<Jwk, VerificationError> {
    jwks.find(kid)
        .cloned()
        .ok_or_else(|| VerificationError::UnknownKeyId(kid.to_string()))
}

//! App Store adapters: JWS verification with a cached provider key set.

mod chain;
mod key_cache;
mod key_source;
mod verifier;

pub use chain::PinnedRoot;
pub use key_cache::{KeyCache, DEFAULT_KEY_TTL, DEFAULT_MIN_REFRESH_INTERVAL};
pub use key_source::{HttpKeySource, SigningKeySource, StaticKeySource};
pub use verifier::AppStoreJwsVerifier;

#[cfg(test)]
pub(crate) use verifier::fixtures;

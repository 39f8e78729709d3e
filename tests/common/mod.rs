//! Shared fixtures for the integration tests.
//!
//! Provides a throwaway certificate chain and P-256 signing key for App Store
//! payloads, Stripe webhook signing, and an in-memory application state.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use entitlement_sync::adapters::app_store::{AppStoreJwsVerifier, KeyCache, StaticKeySource};
use entitlement_sync::adapters::http::entitlement::{
    build_app, EntitlementAppState, ReconciliationSettings,
};
use entitlement_sync::adapters::memory::{InMemoryEntitlementStore, InMemoryProcessedEventStore};
use entitlement_sync::adapters::stripe::{
    signature_header, MockPaymentProvider, StripeWebhookVerifier,
};
use entitlement_sync::domain::entitlement::TierResolver;
use entitlement_sync::domain::foundation::Timestamp;

pub const KID: &str = "integration-key-1";
pub const BUNDLE_ID: &str = "com.acme.feedback";
pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const INTERNAL_TOKEN: &str = "sweep-integration-token";

pub const DAY_MS: i64 = 86_400_000;

// =============================================================================
// App Store signing
// =============================================================================

/// Root, intermediate and signing leaf generated once per test binary.
struct SigningChain {
    x5c: Vec<String>,
    root_fingerprint: String,
    leaf_key_pem: String,
    leaf_point: Vec<u8>,
}

static CHAIN: Lazy<SigningChain> = Lazy::new(|| {
    let ca = |name: &str| {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
    };

    let root_key = KeyPair::generate().unwrap();
    let root = ca("Integration Root CA").self_signed(&root_key).unwrap();
    let intermediate_key = KeyPair::generate().unwrap();
    let intermediate = ca("Integration Intermediate CA")
        .signed_by(&intermediate_key, &root, &root_key)
        .unwrap();

    let mut leaf_params = CertificateParams::default();
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "Integration Signing Key");
    let leaf_key = KeyPair::generate().unwrap();
    let leaf = leaf_params
        .signed_by(&leaf_key, &intermediate, &intermediate_key)
        .unwrap();

    let (_, parsed) = x509_parser::parse_x509_certificate(leaf.der()).unwrap();
    let leaf_point = parsed.public_key().subject_public_key.data.to_vec();

    SigningChain {
        x5c: [leaf.der(), intermediate.der(), root.der()]
            .iter()
            .map(|der| STANDARD.encode(der))
            .collect(),
        root_fingerprint: Sha256::digest(root.der())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect(),
        leaf_key_pem: leaf_key.serialize_pem(),
        leaf_point,
    }
});

fn jwks() -> JwkSet {
    let point = &CHAIN.leaf_point;
    serde_json::from_value(json!({
        "keys": [{
            "kty": "EC",
            "crv": "P-256",
            "kid": KID,
            "alg": "ES256",
            "x": URL_SAFE_NO_PAD.encode(&point[1..33]),
            "y": URL_SAFE_NO_PAD.encode(&point[33..65])
        }]
    }))
    .unwrap()
}

pub fn sign<T: Serialize>(claims: &T) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(KID.to_string());
    header.x5c = Some(CHAIN.x5c.clone());
    let key = EncodingKey::from_ec_pem(CHAIN.leaf_key_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn app_store_verifier() -> AppStoreJwsVerifier {
    let cache = KeyCache::new(Arc::new(StaticKeySource::new(jwks())), Duration::from_secs(3600))
        .with_min_refresh_interval(Duration::ZERO);
    AppStoreJwsVerifier::new(cache, &CHAIN.root_fingerprint, BUNDLE_ID)
}

/// Transaction claims for an App Store subscription purchase.
pub fn transaction(
    transaction_id: &str,
    original_transaction_id: &str,
    product_id: &str,
    purchase_ms: i64,
    expires_ms: i64,
) -> Value {
    json!({
        "transactionId": transaction_id,
        "originalTransactionId": original_transaction_id,
        "productId": product_id,
        "bundleId": BUNDLE_ID,
        "purchaseDate": purchase_ms,
        "expiresDate": expires_ms,
        "signedDate": purchase_ms
    })
}

/// Webhook body for an App Store server notification.
pub fn app_store_notification(
    notification_type: &str,
    subtype: Option<&str>,
    uuid: &str,
    signed_ms: i64,
    transaction: &Value,
) -> Vec<u8> {
    let notification = json!({
        "notificationType": notification_type,
        "subtype": subtype,
        "notificationUUID": uuid,
        "signedDate": signed_ms,
        "data": {
            "bundleId": BUNDLE_ID,
            "signedTransactionInfo": sign(transaction)
        }
    });
    serde_json::to_vec(&json!({ "signedPayload": sign(&notification) })).unwrap()
}

// =============================================================================
// Stripe signing
// =============================================================================

pub fn stripe_signature(payload: &[u8]) -> String {
    signature_header(WEBHOOK_SECRET, Timestamp::now().as_unix_secs(), payload)
}

pub fn stripe_webhook_verifier() -> StripeWebhookVerifier {
    StripeWebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string()))
}

// =============================================================================
// Application state
// =============================================================================

pub struct TestApp {
    pub store: InMemoryEntitlementStore,
    pub processed: InMemoryProcessedEventStore,
    pub stripe: MockPaymentProvider,
    pub state: EntitlementAppState,
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryEntitlementStore::new();
        let processed = InMemoryProcessedEventStore::new();
        let stripe = MockPaymentProvider::new();
        let app_store = Arc::new(app_store_verifier());

        let state = EntitlementAppState {
            store: Arc::new(store.clone()),
            processed_events: Arc::new(processed.clone()),
            app_store_notifications: app_store.clone(),
            stripe_notifications: Arc::new(stripe_webhook_verifier()),
            app_store_receipts: app_store,
            stripe_receipts: Arc::new(stripe.clone()),
            payment_provider: Arc::new(stripe.clone()),
            tier_resolver: TierResolver::default(),
            internal_token: Arc::new(SecretString::new(INTERNAL_TOKEN.to_string())),
            settings: ReconciliationSettings::default(),
        };

        Self {
            store,
            processed,
            stripe,
            state,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_app(self.state.clone(), Duration::from_secs(5))
    }
}

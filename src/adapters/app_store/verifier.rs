//! App Store Server Notification verifier.
//!
//! Every App Store payload is a compact JWS signed with ES256. A payload is
//! accepted only if:
//!
//! 1. The header pins `alg` to ES256 and carries a `kid` and an `x5c` chain
//! 2. The chain verifies link by link up to the pinned root
//! 3. The `kid` resolves in the cached key set to the leaf's public key
//! 4. The signature verifies against that key
//! 5. The `bundleId` matches this app
//!
//! Notifications nest further JWS strings (`signedTransactionInfo`,
//! `signedRenewalInfo`); each is verified the same way.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;

use super::chain::PinnedRoot;
use super::key_cache::KeyCache;
use crate::domain::billing::{
    content_hash_event_id, AppStoreNotification, AppStoreRenewalInfo, AppStoreTransaction,
    VerificationError, VerifiedPayload,
};
use crate::domain::entitlement::ProviderKind;
use crate::domain::foundation::EventId;
use crate::ports::{NotificationVerifier, ReceiptVerifier};

/// Webhook body wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedPayloadBody {
    signed_payload: String,
}

/// Verifies App Store JWS payloads against a pinned root and the provider
/// key set.
#[derive(Clone)]
pub struct AppStoreJwsVerifier {
    keys: KeyCache,
    root: PinnedRoot,
    bundle_id: String,
}

impl AppStoreJwsVerifier {
    /// `root_fingerprint` is the SHA-256 of the root certificate DER, hex
    /// encoded. Colons and case are ignored.
    pub fn new(keys: KeyCache, root_fingerprint: &str, bundle_id: impl Into<String>) -> Self {
        Self {
            keys,
            root: PinnedRoot::new(root_fingerprint),
            bundle_id: bundle_id.into(),
        }
    }

    /// Verifies one compact JWS and decodes its payload.
    async fn verify_jws<T: DeserializeOwned>(&self, token: &str) -> Result<T, VerificationError> {
        let header = decode_header(token)
            .map_err(|e| VerificationError::malformed(format!("Invalid JWS header: {}", e)))?;

        if header.alg != Algorithm::ES256 {
            return Err(VerificationError::signature(format!(
                "Unexpected algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| VerificationError::malformed("JWS header missing kid"))?;

        let chain = header
            .x5c
            .as_deref()
            .ok_or_else(|| VerificationError::signature("Missing certificate chain"))?;
        let leaf_key = self.root.verify_chain(chain)?;

        let jwk = self.keys.get(kid).await?;
        if ec_point(&jwk)? != leaf_key {
            return Err(VerificationError::signature(
                "Leaf certificate does not match signing key",
            ));
        }

        let decoding_key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| VerificationError::malformed(format!("Unusable signing key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        decode::<T>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    fn check_bundle(&self, bundle_id: Option<&str>) -> Result<(), VerificationError> {
        match bundle_id {
            Some(id) if id == self.bundle_id => Ok(()),
            Some(id) => Err(VerificationError::signature(format!(
                "Payload is for bundle {}",
                id
            ))),
            None => Err(VerificationError::malformed("Payload missing bundleId")),
        }
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> VerificationError {
    match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => VerificationError::malformed(e.to_string()),
        _ => VerificationError::signature(e.to_string()),
    }
}

/// The JWK's public key as an uncompressed EC point (`04 || x || y`).
fn ec_point(jwk: &Jwk) -> Result<Vec<u8>, VerificationError> {
    let AlgorithmParameters::EllipticCurve(params) = &jwk.algorithm else {
        return Err(VerificationError::signature("Signing key is not an EC key"));
    };
    let decode = |coordinate: &str| {
        URL_SAFE_NO_PAD
            .decode(coordinate)
            .map_err(|e| VerificationError::malformed(format!("Invalid signing key: {}", e)))
    };

    let mut point = vec![0x04];
    point.extend(decode(&params.x)?);
    point.extend(decode(&params.y)?);
    Ok(point)
}

#[async_trait]
impl NotificationVerifier for AppStoreJwsVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::AppStore
    }

    async fn verify(
        &self,
        raw_payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<VerifiedPayload, VerificationError> {
        let body: SignedPayloadBody = serde_json::from_slice(raw_payload)
            .map_err(|e| VerificationError::malformed(format!("Invalid notification body: {}", e)))?;

        let notification: AppStoreNotification = self.verify_jws(&body.signed_payload).await?;
        let data = notification.data.as_ref();
        self.check_bundle(data.and_then(|d| d.bundle_id.as_deref()))?;

        let transaction = match data.and_then(|d| d.signed_transaction_info.as_deref()) {
            Some(jws) => Some(self.verify_jws::<AppStoreTransaction>(jws).await?),
            None => None,
        };
        let renewal = match data.and_then(|d| d.signed_renewal_info.as_deref()) {
            Some(jws) => Some(self.verify_jws::<AppStoreRenewalInfo>(jws).await?),
            None => None,
        };

        let event_id = notification
            .notification_uuid
            .as_deref()
            .and_then(|uuid| EventId::new(uuid).ok())
            .unwrap_or_else(|| content_hash_event_id(raw_payload));

        Ok(VerifiedPayload::AppStoreNotification {
            event_id,
            notification,
            transaction,
            renewal,
        })
    }
}

#[async_trait]
impl ReceiptVerifier for AppStoreJwsVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::AppStore
    }

    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPayload, VerificationError> {
        let transaction: AppStoreTransaction = self.verify_jws(receipt.trim()).await?;
        self.check_bundle(transaction.bundle_id.as_deref())?;

        Ok(VerifiedPayload::AppStoreTransaction {
            event_id: content_hash_event_id(receipt.trim().as_bytes()),
            transaction,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use jsonwebtoken::Header;
    use serde_json::json;

    fn transaction_claims() -> serde_json::Value {
        json!({
            "transactionId": "2000000001",
            "originalTransactionId": "2000000001",
            "productId": "pro-monthly",
            "bundleId": BUNDLE_ID,
            "purchaseDate": 1_700_000_000_000i64,
            "expiresDate": 1_702_592_000_000i64,
            "signedDate": 1_700_000_000_500i64
        })
    }

    fn notification_body(data: serde_json::Value) -> Vec<u8> {
        let notification = json!({
            "notificationType": "SUBSCRIBED",
            "subtype": "INITIAL_BUY",
            "notificationUUID": "0f9c7d1e-1111-2222-3333-444455556666",
            "signedDate": 1_700_000_001_000i64,
            "version": "2.0",
            "data": data
        });
        serde_json::to_vec(&json!({ "signedPayload": sign(&notification) })).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Notifications
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verifies_notification_and_nested_transaction() {
        let (verifier, _) = verifier();
        let body = notification_body(json!({
            "bundleId": BUNDLE_ID,
            "signedTransactionInfo": sign(&transaction_claims())
        }));

        let payload = verifier.verify(&body, None).await.unwrap();

        match payload {
            VerifiedPayload::AppStoreNotification {
                event_id,
                transaction,
                renewal,
                ..
            } => {
                assert_eq!(event_id.as_str(), "0f9c7d1e-1111-2222-3333-444455556666");
                assert_eq!(transaction.unwrap().original_transaction_id, "2000000001");
                assert!(renewal.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejects_non_json_body() {
        let (verifier, _) = verifier();
        let err = verifier.verify(b"not json", None).await.unwrap_err();
        assert!(matches!(err, VerificationError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn rejects_foreign_bundle() {
        let (verifier, _) = verifier();
        let body = notification_body(json!({ "bundleId": "com.other.app" }));

        let err = verifier.verify(&body, None).await.unwrap_err();
        assert!(matches!(err, VerificationError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn rejects_tampered_nested_transaction() {
        let (verifier, _) = verifier();
        let signed = sign(&transaction_claims());
        let mut parts: Vec<&str> = signed.split('.').collect();
        let forged = STANDARD.encode("{}");
        parts[1] = &forged;
        let body = notification_body(json!({
            "bundleId": BUNDLE_ID,
            "signedTransactionInfo": parts.join(".")
        }));

        assert!(verifier.verify(&body, None).await.is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Header & Chain Checks
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_missing_chain() {
        let (verifier, _) = verifier();
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(KID.into());

        let err = verifier
            .verify_receipt(&sign_with_header(&transaction_claims(), header))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::SignatureInvalid(_)));
    }

    fn header_with_chain(chain: &[&Vec<u8>]) -> Header {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(KID.into());
        header.x5c = Some(chain.iter().map(|der| STANDARD.encode(der)).collect());
        header
    }

    #[tokio::test]
    async fn rejects_chain_without_pinned_root() {
        let (verifier, _) = verifier();
        let header = header_with_chain(&[&PKI.leaf, &PKI.intermediate]);

        let err = verifier
            .verify_receipt(&sign_with_header(&transaction_claims(), header))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VerificationError::signature("Certificate chain does not end at the pinned root")
        );
    }

    #[tokio::test]
    async fn rejects_leaf_not_issued_by_chain() {
        let (verifier, _) = verifier();
        let header = header_with_chain(&[&PKI.forged_leaf, &PKI.intermediate, &PKI.root]);
        let token = sign_with_key(&transaction_claims(), header, &PKI.forged_leaf_key_pem);

        let err = verifier.verify_receipt(&token).await.unwrap_err();

        assert!(
            matches!(&err, VerificationError::SignatureInvalid(msg) if msg.starts_with("Certificate chain signature invalid")),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn rejects_valid_leaf_not_bound_to_key() {
        let (verifier, _) = verifier();
        let header = header_with_chain(&[&PKI.other_leaf, &PKI.intermediate, &PKI.root]);
        let token = sign_with_key(&transaction_claims(), header, &PKI.other_leaf_key_pem);

        let err = verifier.verify_receipt(&token).await.unwrap_err();

        assert_eq!(
            err,
            VerificationError::signature("Leaf certificate does not match signing key")
        );
    }

    #[tokio::test]
    async fn rejects_non_ec_signing_key() {
        let (verifier, source) = verifier();
        source
            .set_keys(
                serde_json::from_value(json!({
                    "keys": [{ "kty": "oct", "kid": KID, "k": "c2VjcmV0" }]
                }))
                .unwrap(),
            )
            .await;

        let err = verifier
            .verify_receipt(&sign(&transaction_claims()))
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::signature("Signing key is not an EC key"));
    }

    #[tokio::test]
    async fn rejects_unknown_kid() {
        let (verifier, _) = verifier();
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some("rotated-away".into());
        header.x5c = Some(PKI.chain());

        let err = verifier
            .verify_receipt(&sign_with_header(&transaction_claims(), header))
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::UnknownKeyId("rotated-away".into()));
    }

    #[tokio::test]
    async fn key_source_outage_with_cold_cache_is_retryable() {
        let (verifier, source) = verifier();
        source.make_unavailable().await;

        let err = verifier
            .verify_receipt(&sign(&transaction_claims()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Client Receipts
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verifies_client_transaction_receipt() {
        let (verifier, _) = verifier();
        let receipt = sign(&transaction_claims());

        let payload = verifier.verify_receipt(&receipt).await.unwrap();

        match payload {
            VerifiedPayload::AppStoreTransaction { event_id, transaction } => {
                assert!(event_id.as_str().starts_with("sha256:"));
                assert_eq!(transaction.product_id, "pro-monthly");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejects_receipt_without_bundle() {
        let (verifier, _) = verifier();
        let mut claims = transaction_claims();
        claims.as_object_mut().unwrap().remove("bundleId");

        let err = verifier.verify_receipt(&sign(&claims)).await.unwrap_err();
        assert!(matches!(err, VerificationError::MalformedPayload(_)));
    }
}

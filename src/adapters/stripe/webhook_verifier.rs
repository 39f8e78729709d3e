//! Stripe webhook signature verification.
//!
//! # Security
//!
//! - HMAC-SHA256 over `"{t}.{raw_body}"` with the endpoint secret
//! - Constant-time comparison against every `v1` entry in the header
//! - Replay window: at most 5 minutes old, at most 60 seconds in the future

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::{content_hash_event_id, StripeEvent, VerificationError, VerifiedPayload};
use crate::domain::entitlement::ProviderKind;
use crate::domain::foundation::EventId;
use crate::ports::NotificationVerifier;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    MissingHeader,
    MissingTimestamp,
    MissingV1Signature,
    InvalidTimestamp,
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed `t=<timestamp>,v1=<hex>[,v1=<hex>...]` header.
///
/// Stripe sends several `v1` entries while an endpoint secret is being
/// rolled; any one of them may match.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex_decode(value.trim()).ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signatures,
        })
    }
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn compute_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, VerificationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VerificationError::signature(format!("Unusable webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds a valid `Stripe-Signature` header for `payload`.
///
/// Used to replay captured events against a local endpoint.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mac = compute_mac(secret, timestamp, payload).unwrap_or_default();
    format!("t={},v1={}", timestamp, hex_encode(&mac))
}

// ════════════════════════════════════════════════════════════════════════════════
// Verifier
// ════════════════════════════════════════════════════════════════════════════════

/// Verifies Stripe webhook deliveries.
#[derive(Clone)]
pub struct StripeWebhookVerifier {
    webhook_secret: SecretString,
    require_livemode: bool,
}

impl StripeWebhookVerifier {
    pub fn new(webhook_secret: SecretString) -> Self {
        Self {
            webhook_secret,
            require_livemode: false,
        }
    }

    /// Reject test-mode events.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    fn check_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
        now: i64,
    ) -> Result<(), VerificationError> {
        let age = now - header.timestamp;
        if age > MAX_EVENT_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay"
            );
            return Err(VerificationError::signature(format!(
                "Event too old ({} seconds)",
                age
            )));
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event from the future - clock skew or manipulation"
            );
            return Err(VerificationError::signature("Event timestamp in future"));
        }

        let expected = compute_mac(
            self.webhook_secret.expose_secret(),
            header.timestamp,
            payload,
        )?;

        let matched = header
            .v1_signatures
            .iter()
            .any(|provided| expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() == 1);
        if !matched {
            tracing::warn!("Invalid Stripe webhook signature");
            return Err(VerificationError::signature("Signature mismatch"));
        }
        Ok(())
    }

    pub(crate) fn verify_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<VerifiedPayload, VerificationError> {
        let header = SignatureHeader::parse(signature.unwrap_or_default())
            .map_err(|e| VerificationError::signature(e.to_string()))?;
        self.check_signature(payload, &header, now)?;

        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            VerificationError::malformed(format!("Invalid JSON: {}", e))
        })?;

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(VerificationError::signature(
                "Test mode events are not accepted",
            ));
        }

        let event_id = EventId::new(event.id.clone()).unwrap_or_else(|_| content_hash_event_id(payload));
        Ok(VerifiedPayload::Stripe { event_id, event })
    }
}

#[async_trait]
impl NotificationVerifier for StripeWebhookVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn verify(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<VerifiedPayload, VerificationError> {
        self.verify_at(raw_payload, signature, chrono::Utc::now().timestamp())
    }
}

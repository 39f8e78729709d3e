//! Stripe API adapter.
//!
//! Implements `PaymentProvider` (hosted checkout and billing portal) and
//! `ReceiptVerifier` (client sync after checkout) over the Stripe REST API.
//!
//! A Stripe "receipt" is a checkout session id. It is never trusted as sent:
//! the session is read back from Stripe with the subscription expanded, and
//! only a completed, paid session becomes a `checkout.session.completed`
//! event.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key);
//! let adapter = StripePaymentAdapter::new(config, reqwest::Client::new());
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::billing::{StripeEvent, StripeEventData, VerificationError, VerifiedPayload};
use crate::domain::entitlement::ProviderKind;
use crate::domain::foundation::EventId;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, ReceiptVerifier,
};

/// Default Stripe API base URL.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: STRIPE_API_BASE.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Session object returned by the create endpoints.
#[derive(Debug, Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: Option<String>,
}

/// Error envelope returned by the Stripe API.
#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeApiError,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Stripe adapter for outbound sessions and receipt verification.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<StripeSessionResponse, PaymentError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response.json().await.map_err(|e| {
            PaymentError::new(
                PaymentErrorCode::ProviderError,
                format!("Failed to parse Stripe response: {}", e),
            )
        })
    }

    /// Reads a checkout session with its subscription expanded.
    async fn fetch_checkout_session(&self, session_id: &str) -> Result<Value, VerificationError> {
        let response = self
            .http_client
            .get(self.url(&format!("/v1/checkout/sessions/{}", session_id)))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .query(&[("expand[]", "subscription")])
            .send()
            .await
            .map_err(|e| {
                VerificationError::SourceUnavailable(format!("Stripe unreachable: {}", e))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VerificationError::malformed(format!(
                "Unknown checkout session {}",
                session_id
            )));
        }
        if !status.is_success() {
            tracing::error!(%status, session_id, "Stripe checkout session lookup failed");
            return Err(VerificationError::SourceUnavailable(format!(
                "Stripe returned {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            VerificationError::SourceUnavailable(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

async fn error_from_response(response: reqwest::Response) -> PaymentError {
    let status = response.status();
    let envelope: Option<StripeErrorEnvelope> = response.json().await.ok();
    let (provider_code, message) = match envelope {
        Some(StripeErrorEnvelope { error }) => (
            error.code,
            error.message.unwrap_or_else(|| status.to_string()),
        ),
        None => (None, status.to_string()),
    };

    let code = match status.as_u16() {
        400 => PaymentErrorCode::InvalidRequest,
        401 | 403 => PaymentErrorCode::AuthenticationError,
        404 => PaymentErrorCode::NotFound,
        429 => PaymentErrorCode::RateLimited,
        _ => PaymentErrorCode::ProviderError,
    };

    tracing::error!(%status, error = %message, "Stripe API call failed");
    let error = PaymentError::new(code, format!("Stripe API error: {}", message));
    match provider_code {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

/// Wraps a retrieved checkout session as the event Stripe would have sent.
///
/// Sessions that are not complete and paid get a type with no mapping, so
/// they never grant anything.
pub(crate) fn session_to_event(session: Value) -> Result<StripeEvent, VerificationError> {
    let id = session
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| VerificationError::malformed("Checkout session without id"))?
        .to_string();
    let created = session
        .get("created")
        .and_then(Value::as_i64)
        .ok_or_else(|| VerificationError::malformed("Checkout session without created"))?;
    let livemode = session
        .get("livemode")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let status = session.get("status").and_then(Value::as_str).unwrap_or("unknown");
    let payment_status = session
        .get("payment_status")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let event_type = match (status, payment_status) {
        ("complete", "paid" | "no_payment_required") => "checkout.session.completed".to_string(),
        (status, payment_status) => format!("checkout.session.{}.{}", status, payment_status),
    };

    Ok(StripeEvent {
        id,
        event_type,
        created,
        data: StripeEventData {
            object: session,
            previous_attributes: None,
        },
        livemode,
        api_version: None,
    })
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let account_id = request.account_id.to_string();
        let mut params = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", request.product_ref.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", account_id.clone()),
            ("metadata[account_id]", account_id.clone()),
            ("metadata[price_id]", request.product_ref.clone()),
            ("subscription_data[metadata][account_id]", account_id),
            ("subscription_data[metadata][price_id]", request.product_ref.clone()),
        ];
        if let Some(customer_id) = &request.customer_id {
            params.push(("customer", customer_id.clone()));
        }

        let session = self.post_form("/v1/checkout/sessions", &params).await?;
        let url = session.url.ok_or_else(|| {
            PaymentError::new(PaymentErrorCode::ProviderError, "Checkout session has no URL")
        })?;

        tracing::info!(
            account_id = %request.account_id,
            session_id = %session.id,
            product_ref = %request.product_ref,
            "Created checkout session"
        );
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let params = [
            ("customer", customer_id.to_string()),
            ("return_url", return_url.to_string()),
        ];

        let session = self.post_form("/v1/billing_portal/sessions", &params).await?;
        let url = session.url.ok_or_else(|| {
            PaymentError::new(PaymentErrorCode::ProviderError, "Portal session has no URL")
        })?;

        Ok(PortalSession {
            id: session.id,
            url,
        })
    }
}

#[async_trait]
impl ReceiptVerifier for StripePaymentAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPayload, VerificationError> {
        let session_id = receipt.trim();
        if !session_id.starts_with("cs_")
            || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(VerificationError::malformed("Receipt is not a checkout session id"));
        }

        let session = self.fetch_checkout_session(session_id).await?;
        let event = session_to_event(session)?;

        Ok(VerifiedPayload::Stripe {
            event_id: EventId::namespaced("stripe:session", &event.id),
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::EventNormalizer;
    use crate::domain::entitlement::EventKind;
    use serde_json::json;

    fn completed_session() -> Value {
        json!({
            "id": "cs_test_1",
            "object": "checkout.session",
            "created": 1_704_067_200,
            "livemode": false,
            "status": "complete",
            "payment_status": "paid",
            "customer": "cus_1",
            "client_reference_id": "7f8c1c52-4a44-4d7b-9a5e-0a0c7c1f2b3d",
            "metadata": { "price_id": "price_pro_monthly" },
            "subscription": {
                "id": "sub_1",
                "current_period_end": 1_706_745_600,
                "items": { "data": [{ "price": { "id": "price_pro_monthly" } }] }
            }
        })
    }

    #[test]
    fn completed_paid_session_becomes_checkout_completed() {
        let event = session_to_event(completed_session()).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.id, "cs_test_1");
        assert_eq!(event.created, 1_704_067_200);
    }

    #[test]
    fn completed_session_normalizes_to_activation() {
        let event = session_to_event(completed_session()).unwrap();
        let payload = VerifiedPayload::Stripe {
            event_id: EventId::namespaced("stripe:session", &event.id),
            event,
        };

        let canonical = EventNormalizer::new().normalize(&payload).unwrap();
        assert_eq!(canonical.kind, EventKind::Activated);
        assert_eq!(canonical.event_id.as_str(), "stripe:checkout:cs_test_1");
        assert_eq!(canonical.product_ref.as_deref(), Some("price_pro_monthly"));
        assert_eq!(canonical.period_end.unwrap().as_unix_secs(), 1_706_745_600);
        assert!(canonical.account_hint.is_some());
    }

    #[test]
    fn unpaid_session_is_not_a_completion() {
        let mut session = completed_session();
        session["status"] = json!("open");
        session["payment_status"] = json!("unpaid");

        let event = session_to_event(session).unwrap();
        assert_eq!(event.event_type, "checkout.session.open.unpaid");
        let payload = VerifiedPayload::Stripe {
            event_id: EventId::namespaced("stripe:session", &event.id),
            event,
        };
        assert!(EventNormalizer::new().normalize(&payload).is_err());
    }

    #[test]
    fn session_without_id_is_malformed() {
        let mut session = completed_session();
        session.as_object_mut().unwrap().remove("id");

        assert!(matches!(
            session_to_event(session),
            Err(VerificationError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn receipt_must_look_like_a_session_id() {
        let adapter = StripePaymentAdapter::new(
            StripeConfig::new(SecretString::new("sk_test".into())).with_base_url("http://127.0.0.1:9"),
            reqwest::Client::new(),
        );

        for bad in ["", "pi_123", "cs_../../v1/customers"] {
            let err = adapter.verify_receipt(bad).await.unwrap_err();
            assert!(matches!(err, VerificationError::MalformedPayload(_)), "{bad}");
        }
    }
}

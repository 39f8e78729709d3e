//! Mock Stripe adapter for tests and local development.
//!
//! Supports:
//! - Error injection for checkout and portal calls
//! - Call tracking
//! - Pre-registered checkout sessions for receipt verification

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::stripe_adapter::session_to_event;
use crate::domain::billing::{VerificationError, VerifiedPayload};
use crate::domain::entitlement::ProviderKind;
use crate::domain::foundation::EventId;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentProvider, PortalSession,
    ReceiptVerifier,
};

/// Mock payment provider.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.set_error(PaymentError::network("connection reset"));
/// assert!(mock.create_portal_session("cus_1", "https://app").await.is_err());
/// ```
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Error to return on the next outbound call.
    next_error: Option<PaymentError>,

    /// Checkout sessions by id, as `GET /v1/checkout/sessions/{id}` returns them.
    sessions: HashMap<String, Value>,

    /// Makes receipt verification fail as if Stripe were down.
    receipts_unavailable: bool,

    call_log: Vec<MethodCall>,

    counter: u32,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Fail the next outbound call with `error`.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Registers a checkout session object for receipt verification.
    pub fn add_checkout_session(&self, session: Value) {
        if let Some(id) = session.get("id").and_then(Value::as_str) {
            let id = id.to_string();
            self.state().sessions.insert(id, session);
        }
    }

    pub fn set_receipts_unavailable(&self, unavailable: bool) {
        self.state().receipts_unavailable = unavailable;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<MethodCall> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    fn record(&self, method: &str, args: Vec<String>) -> Result<u32, PaymentError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        state.counter += 1;
        Ok(state.counter)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let n = self.record(
            "create_checkout_session",
            vec![
                request.account_id.to_string(),
                request.product_ref.clone(),
                request.customer_id.clone().unwrap_or_default(),
            ],
        )?;
        let id = format!("cs_mock_{}", n);
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/c/pay/{}", id),
            id,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let n = self.record(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        )?;
        let id = format!("bps_mock_{}", n);
        Ok(PortalSession {
            url: format!("https://billing.stripe.test/p/session/{}", id),
            id,
        })
    }
}

#[async_trait]
impl ReceiptVerifier for MockPaymentProvider {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPayload, VerificationError> {
        let session = {
            let state = self.state();
            if state.receipts_unavailable {
                return Err(VerificationError::SourceUnavailable("mock outage".into()));
            }
            state.sessions.get(receipt.trim()).cloned()
        };
        let session = session.ok_or_else(|| {
            VerificationError::malformed(format!("Unknown checkout session {}", receipt))
        })?;

        let event = session_to_event(session)?;
        Ok(VerifiedPayload::Stripe {
            event_id: EventId::namespaced("stripe:session", &event.id),
            event,
        })
    }
}

//! HTTP handlers for entitlement endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::application::handlers::{
    ApplyEventHandler, CheckAccessHandler, CheckAccessQuery, CreateAccountEntitlementCommand,
    CreateAccountEntitlementHandler, CreateCheckoutCommand, CreateCheckoutHandler,
    CreatePortalCommand, CreatePortalHandler, GetEntitlementHandler, GetEntitlementQuery,
    HandleProviderWebhookCommand, HandleProviderWebhookHandler, RunExpirySweepCommand,
    RunExpirySweepHandler, SyncClientReceiptCommand, SyncClientReceiptHandler,
};
use crate::domain::entitlement::{EntitlementError, EntitlementReconciler, Feature, TierResolver};
use crate::domain::foundation::{AccountId, Timestamp};
use crate::ports::{
    EntitlementStore, NotificationVerifier, PaymentProvider, ProcessedEventStore, ReceiptVerifier,
};

use super::dto::{
    AccessCheckResponse, CheckoutResponse, CreateCheckoutRequest, CreatePortalRequest,
    EntitlementResponse, ErrorResponse, ExpirySweepResponse, PortalResponse,
    SyncEntitlementRequest, WebhookAckResponse,
};

/// Header the gateway sets after authenticating the caller.
pub const ACCOUNT_ID_HEADER: &str = "X-Account-Id";
/// Shared-secret header for internal endpoints.
pub const INTERNAL_TOKEN_HEADER: &str = "X-Sweep-Token";
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Tunables for the write path and the sweep.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationSettings {
    pub max_write_attempts: u32,
    pub sweep_batch_size: u32,
    pub sweep_concurrency: usize,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            max_write_attempts: crate::application::handlers::DEFAULT_MAX_WRITE_ATTEMPTS,
            sweep_batch_size: crate::application::handlers::DEFAULT_SWEEP_BATCH_SIZE,
            sweep_concurrency: crate::application::handlers::DEFAULT_SWEEP_CONCURRENCY,
        }
    }
}

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct EntitlementAppState {
    pub store: Arc<dyn EntitlementStore>,
    pub processed_events: Arc<dyn ProcessedEventStore>,
    pub app_store_notifications: Arc<dyn NotificationVerifier>,
    pub stripe_notifications: Arc<dyn NotificationVerifier>,
    pub app_store_receipts: Arc<dyn ReceiptVerifier>,
    pub stripe_receipts: Arc<dyn ReceiptVerifier>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub tier_resolver: TierResolver,
    pub internal_token: Arc<SecretString>,
    pub settings: ReconciliationSettings,
}

impl EntitlementAppState {
    /// Create handlers on demand from the shared state.
    pub fn apply_event_handler(&self) -> Arc<ApplyEventHandler> {
        Arc::new(
            ApplyEventHandler::new(
                self.store.clone(),
                self.processed_events.clone(),
                EntitlementReconciler::new(self.tier_resolver.clone()),
            )
            .with_max_attempts(self.settings.max_write_attempts),
        )
    }

    pub fn webhook_handler(&self, verifier: Arc<dyn NotificationVerifier>) -> HandleProviderWebhookHandler {
        HandleProviderWebhookHandler::new(verifier, self.apply_event_handler())
    }

    pub fn sync_handler(&self) -> SyncClientReceiptHandler {
        SyncClientReceiptHandler::new(self.store.clone(), self.apply_event_handler())
            .with_verifier(self.app_store_receipts.clone())
            .with_verifier(self.stripe_receipts.clone())
    }

    pub fn get_entitlement_handler(&self) -> GetEntitlementHandler {
        GetEntitlementHandler::new(self.store.clone())
    }

    pub fn check_access_handler(&self) -> CheckAccessHandler {
        CheckAccessHandler::new(self.store.clone())
    }

    pub fn checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.store.clone(),
            self.payment_provider.clone(),
            self.tier_resolver.clone(),
        )
    }

    pub fn portal_handler(&self) -> CreatePortalHandler {
        CreatePortalHandler::new(self.store.clone(), self.payment_provider.clone())
    }

    pub fn expiry_sweep_handler(&self) -> RunExpirySweepHandler {
        RunExpirySweepHandler::new(self.store.clone(), self.apply_event_handler())
            .with_batch_size(self.settings.sweep_batch_size)
            .with_concurrency(self.settings.sweep_concurrency)
    }

    pub fn create_account_handler(&self) -> CreateAccountEntitlementHandler {
        CreateAccountEntitlementHandler::new(self.store.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Request Context
// ════════════════════════════════════════════════════════════════════════════════

/// Account authenticated by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedAccount {
    pub account_id: AccountId,
}

/// Rejection type for AuthenticatedAccount extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = parts
            .headers
            .get(ACCOUNT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<AccountId>().ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedAccount { account_id })
    }
}

/// Caller that presented the internal shared token.
pub struct InternalCaller;

#[async_trait]
impl FromRequestParts<EntitlementAppState> for InternalCaller {
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &EntitlementAppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthenticationRequired)?;

        let expected = state.internal_token.expose_secret();
        if expected.is_empty() || !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            tracing::warn!("Rejected internal request with invalid token");
            return Err(AuthenticationRequired);
        }
        Ok(InternalCaller)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks (no auth, signature verified)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/app-store - App Store Server Notifications v2
pub async fn handle_app_store_webhook(
    State(state): State<EntitlementAppState>,
    body: Bytes,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let handler = state.webhook_handler(state.app_store_notifications.clone());
    handler
        .handle(HandleProviderWebhookCommand {
            payload: body.to_vec(),
            signature: None,
        })
        .await?;

    Ok(Json(WebhookAckResponse { received: true }))
}

/// POST /webhooks/stripe - Stripe webhook events
pub async fn handle_stripe_webhook(
    State(state): State<EntitlementAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let handler = state.webhook_handler(state.stripe_notifications.clone());
    handler
        .handle(HandleProviderWebhookCommand {
            payload: body.to_vec(),
            signature,
        })
        .await?;

    Ok(Json(WebhookAckResponse { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Account Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /entitlement - Current entitlement with tier limits
pub async fn get_entitlement(
    State(state): State<EntitlementAppState>,
    account: AuthenticatedAccount,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let result = state
        .get_entitlement_handler()
        .handle(GetEntitlementQuery {
            account_id: account.account_id,
        })
        .await?;

    Ok(Json(EntitlementResponse::from(result)))
}

/// POST /entitlement/sync - Client-reported purchase
pub async fn sync_entitlement(
    State(state): State<EntitlementAppState>,
    account: AuthenticatedAccount,
    Json(request): Json<SyncEntitlementRequest>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let entitlement = state
        .sync_handler()
        .handle(SyncClientReceiptCommand {
            account_id: account.account_id,
            provider_kind: request.provider_kind,
            receipt: request.receipt,
        })
        .await?;

    Ok(Json(EntitlementResponse::from(entitlement)))
}

/// POST /entitlement/access - Feature gate check
pub async fn check_access(
    State(state): State<EntitlementAppState>,
    account: AuthenticatedAccount,
    Json(feature): Json<Feature>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let result = state
        .check_access_handler()
        .handle(CheckAccessQuery {
            account_id: account.account_id,
            feature,
        })
        .await?;

    Ok(Json(AccessCheckResponse::from(result)))
}

/// POST /billing/checkout - Start a web checkout
pub async fn create_checkout(
    State(state): State<EntitlementAppState>,
    account: AuthenticatedAccount,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let result = state
        .checkout_handler()
        .handle(CreateCheckoutCommand {
            account_id: account.account_id,
            product_ref: request.product_ref,
            success_url: request.return_urls.success,
            cancel_url: request.return_urls.cancel,
        })
        .await?;

    Ok(Json(CheckoutResponse {
        checkout_url: result.checkout_url,
    }))
}

/// POST /billing/portal - Open the hosted billing portal
pub async fn create_portal(
    State(state): State<EntitlementAppState>,
    account: AuthenticatedAccount,
    Json(request): Json<CreatePortalRequest>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let result = state
        .portal_handler()
        .handle(CreatePortalCommand {
            account_id: account.account_id,
            return_url: request.return_url,
        })
        .await?;

    Ok(Json(PortalResponse {
        portal_url: result.portal_url,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Internal Endpoints (shared token)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /internal/expiry-sweep - Expire lapsed entitlements
pub async fn run_expiry_sweep(
    State(state): State<EntitlementAppState>,
    _caller: InternalCaller,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let result = state
        .expiry_sweep_handler()
        .handle(RunExpirySweepCommand {
            now: Timestamp::now(),
        })
        .await?;

    Ok(Json(ExpirySweepResponse::from(result)))
}

/// POST /internal/accounts/{id} - Create the baseline entitlement
pub async fn create_account_entitlement(
    State(state): State<EntitlementAppState>,
    _caller: InternalCaller,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, EntitlementApiError> {
    let account_id: AccountId = account_id
        .parse()
        .map_err(|_| EntitlementApiError::bad_request("INVALID_ACCOUNT_ID", "Account id must be a UUID"))?;

    let created = state
        .create_account_handler()
        .handle(CreateAccountEntitlementCommand { account_id })
        .await?;

    Ok((StatusCode::CREATED, Json(EntitlementResponse::from(created))))
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts domain errors to HTTP responses.
#[derive(Debug)]
pub enum EntitlementApiError {
    Domain(EntitlementError),
    BadRequest { code: &'static str, message: String },
}

impl EntitlementApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl From<EntitlementError> for EntitlementApiError {
    fn from(err: EntitlementError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for EntitlementApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            EntitlementApiError::Domain(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    tracing::error!(code = err.code(), "Request failed: {}", err);
                }
                (
                    status,
                    ErrorResponse::new(err.code(), err.to_string()).retryable(err.is_retryable()),
                )
            }
            EntitlementApiError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(code, message))
            }
        };
        (status, Json(body)).into_response()
    }
}

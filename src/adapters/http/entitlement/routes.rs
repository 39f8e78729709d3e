//! Axum router configuration for entitlement endpoints.
//!
//! This module defines the route structure for entitlement-related endpoints
//! and wires them to their corresponding handlers.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    check_access, create_account_entitlement, create_checkout, create_portal, get_entitlement,
    handle_app_store_webhook, handle_stripe_webhook, healthz, run_expiry_sweep, sync_entitlement,
    EntitlementAppState,
};

/// Account endpoints (require `X-Account-Id` from the gateway).
///
/// - `GET /entitlement` - Current entitlement with tier limits
/// - `POST /entitlement/sync` - Client-reported purchase
/// - `POST /entitlement/access` - Feature gate check
/// - `POST /billing/checkout` - Start web checkout
/// - `POST /billing/portal` - Billing portal URL
pub fn account_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/entitlement", get(get_entitlement))
        .route("/entitlement/sync", post(sync_entitlement))
        .route("/entitlement/access", post(check_access))
        .route("/billing/checkout", post(create_checkout))
        .route("/billing/portal", post(create_portal))
}

/// Provider webhooks. No user authentication; payloads are signature verified.
///
/// - `POST /app-store`
/// - `POST /stripe`
pub fn webhook_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/app-store", post(handle_app_store_webhook))
        .route("/stripe", post(handle_stripe_webhook))
}

/// Internal endpoints guarded by `X-Sweep-Token`.
///
/// - `POST /expiry-sweep`
/// - `POST /accounts/:id`
pub fn internal_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/expiry-sweep", post(run_expiry_sweep))
        .route("/accounts/:id", post(create_account_entitlement))
}

/// Create the complete entitlement router.
pub fn entitlement_router() -> Router<EntitlementAppState> {
    Router::new()
        .merge(account_routes())
        .nest("/webhooks", webhook_routes())
        .nest("/internal", internal_routes())
        .route("/healthz", get(healthz))
}

/// The served application: routes, state and the HTTP middleware stack.
///
/// # Example
///
/// ```ignore
/// let app = build_app(state, Duration::from_secs(10));
/// axum::serve(listener, app).await?;
/// ```
pub fn build_app(state: EntitlementAppState, request_timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(request_timeout));

    entitlement_router().with_state(state).layer(middleware)
}

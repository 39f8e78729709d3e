//! HTTP adapter for entitlement endpoints.
//!
//! Exposes the entitlement domain via REST API:
//! - `POST /webhooks/app-store` - App Store Server Notifications
//! - `POST /webhooks/stripe` - Stripe webhooks
//! - `GET /entitlement` - Current entitlement and tier limits
//! - `POST /entitlement/sync` - Client-reported purchase
//! - `POST /entitlement/access` - Feature gate check
//! - `POST /billing/checkout` - Start web checkout
//! - `POST /billing/portal` - Billing portal URL
//! - `POST /internal/expiry-sweep` - Expire lapsed entitlements
//! - `POST /internal/accounts/:id` - Create baseline entitlement

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    EntitlementApiError, EntitlementAppState, ReconciliationSettings, ACCOUNT_ID_HEADER,
    INTERNAL_TOKEN_HEADER, STRIPE_SIGNATURE_HEADER,
};
pub use routes::{build_app, entitlement_router};

//! Entitlement handlers.
//!
//! ## Commands
//! - Applying canonical events (shared by every write path)
//! - Processing provider webhooks
//! - Syncing client receipts
//! - Creating checkout and billing portal sessions
//! - Running the expiry sweep
//! - Creating the baseline entitlement for a new account
//!
//! ## Queries
//! - Get entitlement with tier limits
//! - Check feature access

mod apply_event;
mod check_access;
mod create_account_entitlement;
mod create_checkout;
mod create_portal;
mod get_entitlement;
mod handle_provider_webhook;
mod run_expiry_sweep;
mod sync_client_receipt;

// Commands
pub use apply_event::{ApplyEventHandler, ApplyOutcome, DEFAULT_MAX_WRITE_ATTEMPTS};
pub use create_account_entitlement::{
    CreateAccountEntitlementCommand, CreateAccountEntitlementHandler,
};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use create_portal::{CreatePortalCommand, CreatePortalHandler, CreatePortalResult};
pub use handle_provider_webhook::{
    HandleProviderWebhookCommand, HandleProviderWebhookHandler, HandleProviderWebhookResult,
};
pub use run_expiry_sweep::{
    RunExpirySweepCommand, RunExpirySweepHandler, RunExpirySweepResult, DEFAULT_SWEEP_BATCH_SIZE,
    DEFAULT_SWEEP_CONCURRENCY,
};
pub use sync_client_receipt::{SyncClientReceiptCommand, SyncClientReceiptHandler};

// Queries
pub use check_access::{CheckAccessHandler, CheckAccessQuery, CheckAccessResult};
pub use get_entitlement::{GetEntitlementHandler, GetEntitlementQuery, GetEntitlementResult};

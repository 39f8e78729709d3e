//! Entitlement Sync - subscription entitlement reconciliation
//!
//! Reconciles App Store server notifications and Stripe webhooks into one
//! canonical entitlement per account, and exposes it to feature code through
//! tier-based access checks.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

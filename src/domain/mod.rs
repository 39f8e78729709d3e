//! Domain layer - pure entitlement and billing logic.

pub mod billing;
pub mod entitlement;
pub mod foundation;

//! Reconciliation tuning

use serde::Deserialize;

use super::error::ValidationError;
use crate::application::handlers::{
    DEFAULT_MAX_WRITE_ATTEMPTS, DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_CONCURRENCY,
};

/// Write retry and expiry sweep settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Compare-and-swap attempts before a write is reported as contended
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,

    /// Lapsed rows handled per sweep pass
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,

    /// Rows expired concurrently within a pass
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
}

impl ReconciliationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_write_attempts == 0 || self.max_write_attempts > 20 {
            return Err(ValidationError::OutOfRange(
                "RECONCILIATION__MAX_WRITE_ATTEMPTS",
            ));
        }
        if self.sweep_batch_size == 0 || self.sweep_batch_size > 10_000 {
            return Err(ValidationError::OutOfRange("RECONCILIATION__SWEEP_BATCH_SIZE"));
        }
        if self.sweep_concurrency == 0 || self.sweep_concurrency > 64 {
            return Err(ValidationError::OutOfRange(
                "RECONCILIATION__SWEEP_CONCURRENCY",
            ));
        }
        Ok(())
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: default_max_write_attempts(),
            sweep_batch_size: default_sweep_batch_size(),
            sweep_concurrency: default_sweep_concurrency(),
        }
    }
}

fn default_max_write_attempts() -> u32 {
    DEFAULT_MAX_WRITE_ATTEMPTS
}

fn default_sweep_batch_size() -> u32 {
    DEFAULT_SWEEP_BATCH_SIZE
}

fn default_sweep_concurrency() -> usize {
    DEFAULT_SWEEP_CONCURRENCY
}

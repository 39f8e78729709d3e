//! Stripe configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::stripe::STRIPE_API_BASE;

/// Stripe API and webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSettings {
    /// Secret API key (`sk_live_...` or `sk_test_...`)
    pub api_key: SecretString,

    /// Webhook endpoint signing secret (`whsec_...`)
    pub webhook_secret: SecretString,

    /// API base URL, overridable for stripe-mock
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Drop test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

impl StripeSettings {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }

    /// Validate Stripe configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let api_key = self.api_key.expose_secret();
        let webhook_secret = self.webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE__API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE__WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") && !api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if *environment == Environment::Production && self.is_test_mode() && self.require_livemode
        {
            return Err(ValidationError::InvalidStripeKey);
        }
        Ok(())
    }
}

fn default_api_base() -> String {
    STRIPE_API_BASE.to_string()
}

#[cfg(test)]
pub(crate) fn test_stripe_settings() -> StripeSettings {
    StripeSettings {
        api_key: SecretString::new("sk_test_xxx".to_string()),
        webhook_secret: SecretString::new("whsec_xxx".to_string()),
        api_base: default_api_base(),
        require_livemode: false,
    }
}

//! HandleProviderWebhookHandler - Command handler for provider server
//! notifications (App Store Server Notifications v2, Stripe webhooks).
//!
//! Verification failures are the only client error; everything after a
//! successful verification acknowledges, so providers stop redelivering
//! payloads that will never map to anything.

use std::sync::Arc;

use super::apply_event::{ApplyEventHandler, ApplyOutcome};
use crate::domain::billing::{EventNormalizer, NormalizeError};
use crate::domain::entitlement::{EntitlementError, ProviderKind};
use crate::ports::NotificationVerifier;

/// Command to handle one webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleProviderWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Out-of-band signature header, if the provider sends one.
    pub signature: Option<String>,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleProviderWebhookResult {
    /// The event was normalized and handed to the reconciler.
    Processed(ApplyOutcome),
    /// Verified, but not something we act on.
    Ignored { reason: String },
}

/// Handler for one provider's webhook endpoint.
pub struct HandleProviderWebhookHandler {
    verifier: Arc<dyn NotificationVerifier>,
    normalizer: EventNormalizer,
    applier: Arc<ApplyEventHandler>,
}

impl HandleProviderWebhookHandler {
    pub fn new(verifier: Arc<dyn NotificationVerifier>, applier: Arc<ApplyEventHandler>) -> Self {
        Self {
            verifier,
            normalizer: EventNormalizer::new(),
            applier,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.verifier.provider()
    }

    pub async fn handle(
        &self,
        cmd: HandleProviderWebhookCommand,
    ) -> Result<HandleProviderWebhookResult, EntitlementError> {
        let provider = self.verifier.provider();

        // 1. Authenticate
        let payload = self
            .verifier
            .verify(&cmd.payload, cmd.signature.as_deref())
            .await
            .map_err(|e| {
                tracing::warn!(provider = %provider, error = %e, "Webhook verification failed");
                e
            })?;

        // 2. Normalize
        let event = match self.normalizer.normalize(&payload) {
            Ok(event) => event,
            Err(e) => {
                match &e {
                    NormalizeError::UnmappableEventType { event_type, .. } => tracing::warn!(
                        provider = %provider,
                        event_id = %payload.event_id(),
                        event_type = %event_type,
                        "Unmappable event type, acknowledging"
                    ),
                    other => tracing::warn!(
                        provider = %provider,
                        event_id = %payload.event_id(),
                        error = %other,
                        "Verified payload could not be normalized, acknowledging"
                    ),
                }
                return Ok(HandleProviderWebhookResult::Ignored {
                    reason: e.to_string(),
                });
            }
        };

        // 3. Apply
        let outcome = self.applier.apply(&event).await?;
        Ok(HandleProviderWebhookResult::Processed(outcome))
    }
}

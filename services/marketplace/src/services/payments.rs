//! Paid membership updates driven by the payment provider's webhook

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    models::User,
    store::MarketplaceStore,
    webhook::{PaymentEvent, verify_signature},
};

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn MarketplaceStore>,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn MarketplaceStore>, webhook_secret: Option<String>) -> Self {
        Self {
            store,
            webhook_secret,
        }
    }

    /// Verify and apply one webhook delivery.
    ///
    /// The body is parsed only after the signature checks out. Returns the
    /// updated user when the event granted a membership.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> ApiResult<Option<User>> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ApiError::Internal("Payment webhook secret is not configured".to_string())
        })?;

        let signature = signature.ok_or(ApiError::Unauthorized)?;
        if !verify_signature(secret, body, signature) {
            warn!("Rejected payment webhook with an invalid signature");
            return Err(ApiError::Unauthorized);
        }

        let event: PaymentEvent = serde_json::from_slice(body)
            .map_err(|e| ApiError::Validation(format!("Invalid webhook payload: {}", e)))?;

        self.apply_event(&event).await
    }

    async fn apply_event(&self, event: &PaymentEvent) -> ApiResult<Option<User>> {
        if !event.is_charge_success() {
            info!("Ignoring payment event {}", event.event);
            return Ok(None);
        }

        let Some(payer) = event.payer() else {
            warn!(
                "Payment {:?} carries neither a user id nor a customer email",
                event.data.reference
            );
            return Ok(None);
        };

        match self.store.mark_paid_member(&payer).await? {
            Some(user) => {
                info!("User {} is now a paid member", user.id);
                Ok(Some(user))
            }
            None => {
                warn!("Payment {:?} matched no user ({:?})", event.data.reference, payer);
                Ok(None)
            }
        }
    }
}

//! Subscription Cancellation
//!
//! Cancels at the end of the paid period, then mirrors the new state onto the
//! member's record. The two writes are not atomic: if the record update fails
//! Stripe already says "canceling" and nothing rolls that back.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{BillingError, Result};
use crate::provider::PaymentProvider;
use crate::records::{SubscriptionUpdate, UserRecordStore};

/// Outcome reported to the member
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub message: String,
    pub subscription_id: String,
    /// Period end, ISO-8601
    pub cancel_at: Option<String>,
    /// False when the subscription was already set to cancel
    #[serde(skip)]
    pub changed: bool,
}

pub struct SubscriptionCanceler {
    provider: Arc<dyn PaymentProvider>,
    records: Arc<dyn UserRecordStore>,
}

impl SubscriptionCanceler {
    pub fn new(provider: Arc<dyn PaymentProvider>, records: Arc<dyn UserRecordStore>) -> Self {
        Self { provider, records }
    }

    pub async fn cancel(&self, user_id: Option<&str>, subscription_id: Option<&str>) -> Result<Cancellation> {
        let user_id = user_id.map(str::trim).filter(|u| !u.is_empty());
        let subscription_id = subscription_id.map(str::trim).filter(|s| !s.is_empty());

        let subscription = match subscription_id {
            Some(id) => self.provider.retrieve_subscription(id).await?,
            None => None,
        };

        let Some(subscription) = subscription else {
            return Err(BillingError::NotFound(format!(
                "subscription {}",
                subscription_id.unwrap_or("<none>")
            )));
        };

        if subscription.cancel_at_period_end {
            tracing::info!(subscription_id = %subscription.id, "Subscription already set to cancel");
            return Ok(Cancellation {
                message: "Subscription is already scheduled to cancel at the end of the billing period"
                    .into(),
                cancel_at: subscription.period_end_iso(),
                subscription_id: subscription.id,
                changed: false,
            });
        }

        let user_id = user_id.ok_or_else(|| BillingError::missing("uid"))?;

        let updated = self.provider.cancel_at_period_end(&subscription.id).await?;
        tracing::info!(
            subscription_id = %updated.id,
            user_id = %user_id,
            period_end = updated.current_period_end,
            "Subscription set to cancel at period end"
        );

        if let Err(e) = self
            .records
            .update_subscription(user_id, SubscriptionUpdate::canceled(updated.period_end()))
            .await
        {
            tracing::error!(
                subscription_id = %updated.id,
                user_id = %user_id,
                error = %e,
                "Stripe cancellation succeeded but user record update failed"
            );
            return Err(e);
        }

        Ok(Cancellation {
            message: "Subscription will be canceled at the end of the billing period".into(),
            cancel_at: updated.period_end_iso(),
            subscription_id: updated.id,
            changed: true,
        })
    }
}

//! Payment Provider Integration
//!
//! The provider owns checkout sessions and subscriptions. Services receive an
//! `Arc<dyn PaymentProvider>` so Stripe can be swapped for the mock in tests.

mod mock;
mod stripe_client;

pub use mock::MockPaymentProvider;
pub use stripe_client::StripeProvider;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::PaymentMethod;
use crate::error::Result;

/// Payment provider trait (Strategy pattern)
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted subscription checkout session
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession>;

    /// Fetch a checkout session by ID
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession>;

    /// Fetch a subscription by ID, `None` if the provider has no such subscription
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>>;

    /// Flag a subscription to cancel at the end of its current period
    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<Subscription>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Parameters for a new checkout session
#[derive(Clone, Debug, Default)]
pub struct SessionRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque correlation value read back by the success handler
    pub client_reference: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Restrict the hosted page to one payment method type
    pub payment_method: Option<PaymentMethod>,
}

/// Payment state of a checkout session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// A checkout session as seen by the application
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session ID (`cs_...`)
    pub id: String,

    /// Hosted payment page
    pub url: Option<String>,

    pub client_reference: Option<String>,

    /// Subscription created once the customer paid
    pub subscription_id: Option<String>,

    pub payment_status: PaymentStatus,

    pub customer_email: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Subscription status from the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
    Unknown,
}

impl SubscriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" | "cancelled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription as seen by the application
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub status: SubscriptionStatus,
    /// End of the current billing period (Unix seconds)
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
}

impl Subscription {
    /// Period end as a UTC timestamp
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_end, 0)
    }

    /// Period end rendered as ISO-8601 with milliseconds, e.g. `2023-11-14T22:13:20.000Z`
    pub fn period_end_iso(&self) -> Option<String> {
        self.period_end()
            .map(|end| end.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

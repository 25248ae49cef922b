//! Stripe Provider
//!
//! Talks to the Stripe API through `async-stripe`. Sessions are created in
//! subscription mode against an existing Stripe price.

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionPaymentMethodTypes, StripeError, Subscription as StripeSubscription,
    SubscriptionId, UpdateSubscription,
};

use super::{
    CheckoutSession, PaymentProvider, PaymentStatus, SessionRequest, Subscription,
    SubscriptionStatus,
};
use crate::catalog::PaymentMethod;
use crate::error::{BillingError, Result};

/// Stripe client wrapper
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".into()))?;
        if secret_key.trim().is_empty() {
            return Err(BillingError::Config("STRIPE_SECRET_KEY is empty".into()));
        }

        Ok(Self::new(&secret_key))
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.client_reference_id = request.client_reference.as_deref();
        params.customer_email = request.customer_email.as_deref();

        if !request.metadata.is_empty() {
            params.metadata = Some(request.metadata.clone());
        }

        if let Some(method) = request.payment_method {
            params.payment_method_types = Some(vec![match method {
                PaymentMethod::Ach => CreateCheckoutSessionPaymentMethodTypes::UsBankAccount,
                PaymentMethod::Card => CreateCheckoutSessionPaymentMethodTypes::Card,
            }]);
        }

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(provider_error)?;

        tracing::debug!(session_id = %session.id, price_id = %request.price_id, "Created Stripe checkout session");

        Ok(convert_session(session))
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|_| BillingError::NotFound(format!("checkout session {session_id}")))?;

        match StripeCheckoutSession::retrieve(&self.client, &id, &[]).await {
            Ok(session) => Ok(convert_session(session)),
            Err(e) if is_missing(&e) => {
                Err(BillingError::NotFound(format!("checkout session {session_id}")))
            }
            Err(e) => Err(provider_error(e)),
        }
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let Ok(id) = subscription_id.parse::<SubscriptionId>() else {
            return Ok(None);
        };

        match StripeSubscription::retrieve(&self.client, &id, &[]).await {
            Ok(sub) => Ok(Some(convert_subscription(&sub))),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(provider_error(e)),
        }
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<Subscription> {
        let id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|_| BillingError::NotFound(format!("subscription {subscription_id}")))?;

        let mut params = UpdateSubscription::new();
        params.cancel_at_period_end = Some(true);

        let sub = StripeSubscription::update(&self.client, &id, params)
            .await
            .map_err(provider_error)?;

        Ok(convert_subscription(&sub))
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}

fn provider_error(e: StripeError) -> BillingError {
    BillingError::Provider(e.to_string())
}

fn is_missing(e: &StripeError) -> bool {
    matches!(e, StripeError::Stripe(err) if err.http_status == 404)
}

fn convert_session(session: StripeCheckoutSession) -> CheckoutSession {
    CheckoutSession {
        id: session.id.to_string(),
        url: session.url,
        client_reference: session.client_reference_id,
        subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
        payment_status: match session.payment_status {
            CheckoutSessionPaymentStatus::Paid => PaymentStatus::Paid,
            CheckoutSessionPaymentStatus::Unpaid => PaymentStatus::Unpaid,
            CheckoutSessionPaymentStatus::NoPaymentRequired => PaymentStatus::NoPaymentRequired,
        },
        customer_email: session.customer_email,
        metadata: session.metadata.unwrap_or_default(),
    }
}

fn convert_subscription(sub: &StripeSubscription) -> Subscription {
    Subscription {
        id: sub.id.to_string(),
        status: SubscriptionStatus::parse(&sub.status.to_string()),
        current_period_end: sub.current_period_end,
        cancel_at_period_end: sub.cancel_at_period_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_provider_creation() {
        let provider = StripeProvider::new("sk_test_mock_key");
        assert_eq!(provider.name(), "Stripe");
    }

    #[test]
    fn test_payment_status_mapping() {
        for (stripe_status, expected) in [
            (CheckoutSessionPaymentStatus::Paid, PaymentStatus::Paid),
            (CheckoutSessionPaymentStatus::Unpaid, PaymentStatus::Unpaid),
            (CheckoutSessionPaymentStatus::NoPaymentRequired, PaymentStatus::NoPaymentRequired),
        ] {
            let session = StripeCheckoutSession {
                payment_status: stripe_status,
                ..Default::default()
            };
            assert_eq!(convert_session(session).payment_status, expected);
        }
    }

    #[tokio::test]
    async fn test_malformed_subscription_id_is_not_found() {
        let provider = StripeProvider::new("sk_test_mock_key");
        let result = provider.retrieve_subscription("not-a-subscription").await.unwrap();
        assert!(result.is_none());
    }
}

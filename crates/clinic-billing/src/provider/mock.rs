//! Mock Payment Provider
//!
//! For testing and demo purposes. Keeps sessions and subscriptions in memory,
//! records every call and can be told to fail a given operation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    CheckoutSession, PaymentProvider, PaymentStatus, SessionRequest, Subscription,
    SubscriptionStatus,
};
use crate::error::{BillingError, Result};

/// In-memory stand-in for Stripe
#[derive(Default)]
pub struct MockPaymentProvider {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, CheckoutSession>,
    subscriptions: HashMap<String, Subscription>,
    /// Operation name -> provider message to fail with
    failures: HashMap<String, String>,
    calls: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session as if Stripe already held it
    pub fn insert_session(&self, session: CheckoutSession) {
        self.state().sessions.insert(session.id.clone(), session);
    }

    /// Register a subscription as if Stripe already held it
    pub fn insert_subscription(&self, subscription: Subscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Simulate the customer paying on the hosted page.
    ///
    /// Marks the session paid and attaches a fresh active subscription whose
    /// period ends `period_days` from now. Returns the subscription ID.
    pub fn complete_session(&self, session_id: &str, period_days: i64) -> Result<String> {
        let mut state = self.state();

        let subscription = Subscription {
            id: format!("sub_test_{}", short_id()),
            status: SubscriptionStatus::Active,
            current_period_end: (Utc::now() + Duration::days(period_days)).timestamp(),
            cancel_at_period_end: false,
        };

        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| BillingError::NotFound(format!("checkout session {session_id}")))?;
        session.payment_status = PaymentStatus::Paid;
        session.subscription_id = Some(subscription.id.clone());

        let id = subscription.id.clone();
        state.subscriptions.insert(id.clone(), subscription);
        Ok(id)
    }

    /// Make every later call to `operation` fail with a provider error
    pub fn fail_on(&self, operation: &str, message: &str) {
        self.state()
            .failures
            .insert(operation.to_string(), message.to_string());
    }

    /// Names of all operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// How many times `operation` was called
    pub fn call_count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.state().subscriptions.get(subscription_id).cloned()
    }

    pub fn session(&self, session_id: &str) -> Option<CheckoutSession> {
        self.state().sessions.get(session_id).cloned()
    }

    fn record(&self, operation: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        match state.failures.get(operation) {
            Some(message) => Err(BillingError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(&self, request: SessionRequest) -> Result<CheckoutSession> {
        self.record("create_checkout_session")?;

        let id = format!("cs_test_{}", short_id());
        let session = CheckoutSession {
            url: Some(format!("https://checkout.stripe.com/c/pay/{id}")),
            id,
            client_reference: request.client_reference,
            subscription_id: None,
            payment_status: PaymentStatus::Unpaid,
            customer_email: request.customer_email,
            metadata: request.metadata,
        };

        self.insert_session(session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession> {
        self.record("retrieve_checkout_session")?;
        self.session(session_id)
            .ok_or_else(|| BillingError::NotFound(format!("checkout session {session_id}")))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        self.record("retrieve_subscription")?;
        Ok(self.subscription(subscription_id))
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<Subscription> {
        self.record("cancel_at_period_end")?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| BillingError::NotFound(format!("subscription {subscription_id}")))?;
        subscription.cancel_at_period_end = true;
        Ok(subscription.clone())
    }

    fn name(&self) -> &str {
        "MockStripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SessionRequest {
        SessionRequest {
            price_id: "price_solo_monthly_card".into(),
            success_url: "https://example.com/success".into(),
            cancel_url: "https://example.com/cancel".into(),
            client_reference: Some("uid=7".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let provider = MockPaymentProvider::new();

        let session = provider.create_checkout_session(request()).await.unwrap();
        assert!(session.id.starts_with("cs_"));
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);

        let sub_id = provider.complete_session(&session.id, 30).unwrap();
        let fetched = provider.retrieve_checkout_session(&session.id).await.unwrap();
        assert_eq!(fetched.payment_status, PaymentStatus::Paid);
        assert_eq!(fetched.subscription_id.as_deref(), Some(sub_id.as_str()));
        assert_eq!(fetched.client_reference.as_deref(), Some("uid=7"));
    }

    #[tokio::test]
    async fn test_failure_injection_is_recorded() {
        let provider = MockPaymentProvider::new();
        provider.fail_on("create_checkout_session", "No such price: 'price_x'");

        let err = provider.create_checkout_session(request()).await.unwrap_err();
        assert!(matches!(err, BillingError::Provider(_)));
        assert_eq!(provider.call_count("create_checkout_session"), 1);
    }

    #[tokio::test]
    async fn test_unknown_subscription() {
        let provider = MockPaymentProvider::new();
        assert!(provider.retrieve_subscription("sub_missing").await.unwrap().is_none());
    }
}

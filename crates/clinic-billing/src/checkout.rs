//! Stripe Checkout (Hosted) Flow
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ Plan selector│──▶│  Stripe Hosted  │──▶│ checkout-success │──▶│ confirmation │
//! │  (initiate)  │   │  Checkout Page  │   │   (this crate)   │   │    route     │
//! └──────────────┘   └─────────────────┘   └──────────────────┘   └──────────────┘
//! ```
//!
//! The alternate variant sends the customer back to a client verify route,
//! which asks [`SessionVerifier`] whether the session was paid.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::catalog::PlanCatalog;
use crate::correlation::ClientReferenceCodec;
use crate::error::{BillingError, Result};
use crate::provider::{PaymentProvider, PaymentStatus, SessionRequest, Subscription};

/// Query value escaping: everything outside the unreserved set and `:`
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':');

/// Placeholder Stripe replaces with the session ID in success URLs
pub const SESSION_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Fixed redirect targets of the checkout flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRoutes {
    /// Stripe success redirect for the primary flow (server callback)
    pub success_url: String,

    /// Stripe success redirect for the alternate flow (client verify page)
    pub verify_url: String,

    /// Stripe cancel redirect; also where failed callbacks land
    pub cancel_url: String,

    /// Client page showing the activated membership
    pub confirmation_url: String,
}

impl CheckoutRoutes {
    /// Derive every route from the public site URL
    pub fn from_site_url(site_url: &str) -> Self {
        let site = site_url.trim_end_matches('/');
        Self {
            success_url: format!("{site}/api/checkout-success?session_id={SESSION_PLACEHOLDER}"),
            verify_url: format!("{site}/membership/verify?session_id={SESSION_PLACEHOLDER}"),
            cancel_url: format!("{site}/membership?checkout=canceled"),
            confirmation_url: format!("{site}/membership/confirmation"),
        }
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BillingError::missing(field)),
    }
}

/// Hosted page for a newly created session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartedCheckout {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect the member to
    pub url: String,
}

/// Creates hosted subscription checkout sessions
pub struct CheckoutInitiator {
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<PlanCatalog>,
    codec: ClientReferenceCodec,
    routes: CheckoutRoutes,
}

impl CheckoutInitiator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<PlanCatalog>,
        codec: ClientReferenceCodec,
        routes: CheckoutRoutes,
    ) -> Self {
        Self {
            provider,
            catalog,
            codec,
            routes,
        }
    }

    fn base_request(&self, price_id: &str, success_url: &str) -> SessionRequest {
        SessionRequest {
            price_id: price_id.to_string(),
            success_url: success_url.to_string(),
            cancel_url: self.routes.cancel_url.clone(),
            payment_method: self.catalog.by_price_ref(price_id).map(|p| p.payment_method),
            ..Default::default()
        }
    }

    async fn create(&self, request: SessionRequest) -> Result<StartedCheckout> {
        let session = self.provider.create_checkout_session(request).await?;
        let url = session
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| BillingError::Provider("No checkout URL returned".into()))?;

        Ok(StartedCheckout { id: session.id, url })
    }

    /// Start checkout for a signed-in member
    pub async fn start(&self, price_id: Option<&str>, user_id: Option<&str>) -> Result<StartedCheckout> {
        let price_id = required(price_id, "priceId")?;
        let user_id = required(user_id, "userId")?;

        let mut request = self.base_request(price_id, &self.routes.success_url);
        request.client_reference = Some(self.codec.encode(user_id)?);

        let started = self.create(request).await?;
        tracing::info!(
            session_id = %started.id,
            price_id = %price_id,
            user_id = %user_id,
            "Created checkout session"
        );
        Ok(started)
    }

    /// Start checkout identified by email (alternate variant)
    pub async fn start_for_email(
        &self,
        price_id: Option<&str>,
        email: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<StartedCheckout> {
        let price_id = required(price_id, "priceId")?;
        let email = required(email, "email")?;

        let mut request = self.base_request(price_id, &self.routes.verify_url);
        request.customer_email = Some(email.to_string());
        request.metadata = metadata;

        let started = self.create(request).await?;
        tracing::info!(session_id = %started.id, price_id = %price_id, "Created email checkout session");
        Ok(started)
    }
}

/// What the confirmation route is told about a finished checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub status: String,
    pub user_id: String,
    pub session_id: String,
    pub subscription_id: String,
    pub end_date: DateTime<Utc>,
}

impl Confirmation {
    /// `<base>?paid=..&uid=..&session=..&subscription=..&end_date=..`
    pub fn redirect_url(&self, base: &str) -> String {
        let end_date = self.end_date.to_rfc3339_opts(SecondsFormat::Millis, true);
        let pairs = [
            ("paid", self.status.as_str()),
            ("uid", self.user_id.as_str()),
            ("session", self.session_id.as_str()),
            ("subscription", self.subscription_id.as_str()),
            ("end_date", end_date.as_str()),
        ];

        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, QUERY_VALUE)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}{query}")
    }
}

/// Handles Stripe's redirect after a completed checkout
pub struct CheckoutSuccessHandler {
    provider: Arc<dyn PaymentProvider>,
    codec: ClientReferenceCodec,
    routes: CheckoutRoutes,
}

impl CheckoutSuccessHandler {
    pub fn new(provider: Arc<dyn PaymentProvider>, codec: ClientReferenceCodec, routes: CheckoutRoutes) -> Self {
        Self {
            provider,
            codec,
            routes,
        }
    }

    /// Resolve a session into the data shown on the confirmation route
    pub async fn confirm(&self, session_id: Option<&str>) -> Result<Confirmation> {
        let session_id = required(session_id, "session_id")?;

        let session = self.provider.retrieve_checkout_session(session_id).await?;
        let subscription_id = session
            .subscription_id
            .ok_or_else(|| BillingError::NotFound(format!("subscription for session {session_id}")))?;

        let subscription = self
            .provider
            .retrieve_subscription(&subscription_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("subscription {subscription_id}")))?;

        let end_date = subscription.period_end().ok_or_else(|| {
            BillingError::Provider(format!(
                "invalid period end {} on {subscription_id}",
                subscription.current_period_end
            ))
        })?;

        let reference = session
            .client_reference
            .ok_or_else(|| BillingError::ClientReference("session has no client reference".into()))?;
        let user_id = self.codec.decode(&reference)?;

        Ok(Confirmation {
            status: subscription.status.to_string(),
            user_id,
            session_id: session.id,
            subscription_id,
            end_date,
        })
    }

    /// Where to send the browser. Failures land on the cancel route.
    pub async fn redirect_target(&self, session_id: Option<&str>) -> String {
        match self.confirm(session_id).await {
            Ok(confirmation) => {
                tracing::info!(
                    session_id = %confirmation.session_id,
                    subscription_id = %confirmation.subscription_id,
                    user_id = %confirmation.user_id,
                    status = %confirmation.status,
                    "Checkout completed"
                );
                confirmation.redirect_url(&self.routes.confirmation_url)
            }
            Err(e) => {
                tracing::error!(session_id = ?session_id, error = %e, "Checkout success callback failed");
                self.routes.cancel_url.clone()
            }
        }
    }
}

/// Result of verifying a session
#[derive(Clone, Debug, Serialize)]
pub struct Verification {
    pub success: bool,
    pub subscription: Option<Subscription>,
}

/// Confirms payment of a session (alternate variant)
pub struct SessionVerifier {
    provider: Arc<dyn PaymentProvider>,
}

impl SessionVerifier {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Succeeds only when the session's payment status is `paid`.
    ///
    /// Does not touch the user record.
    pub async fn verify(&self, session_id: Option<&str>) -> Result<Verification> {
        let session_id = required(session_id, "sessionId")?;
        let session = self.provider.retrieve_checkout_session(session_id).await?;

        if session.payment_status != PaymentStatus::Paid {
            tracing::warn!(session_id = %session_id, status = ?session.payment_status, "Session not paid");
            return Err(BillingError::PaymentIncomplete(session_id.to_string()));
        }

        let subscription = match session.subscription_id {
            Some(ref id) => self.provider.retrieve_subscription(id).await?,
            None => None,
        };

        Ok(Verification {
            success: true,
            subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PaymentMethod;
    use crate::provider::{CheckoutSession, MockPaymentProvider, SubscriptionStatus};

    const SITE: &str = "https://clinics.example.org";

    fn routes() -> CheckoutRoutes {
        CheckoutRoutes::from_site_url(SITE)
    }

    fn initiator(provider: &Arc<MockPaymentProvider>) -> CheckoutInitiator {
        CheckoutInitiator::new(
            provider.clone(),
            Arc::new(PlanCatalog::standard()),
            ClientReferenceCodec::unsigned(),
            routes(),
        )
    }

    fn success_handler(provider: &Arc<MockPaymentProvider>) -> CheckoutSuccessHandler {
        CheckoutSuccessHandler::new(provider.clone(), ClientReferenceCodec::unsigned(), routes())
    }

    fn paid_session(provider: &MockPaymentProvider, reference: &str) {
        provider.insert_subscription(Subscription {
            id: "sub_1NQ".into(),
            status: SubscriptionStatus::Active,
            current_period_end: 1_700_000_000,
            cancel_at_period_end: false,
        });
        provider.insert_session(CheckoutSession {
            id: "cs_test_a1".into(),
            url: None,
            client_reference: Some(reference.into()),
            subscription_id: Some("sub_1NQ".into()),
            payment_status: PaymentStatus::Paid,
            customer_email: None,
            metadata: HashMap::new(),
        });
    }

    #[test]
    fn test_routes_from_site_url() {
        let routes = CheckoutRoutes::from_site_url("https://clinics.example.org/");
        assert_eq!(
            routes.success_url,
            "https://clinics.example.org/api/checkout-success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(routes.confirmation_url, "https://clinics.example.org/membership/confirmation");
    }

    #[tokio::test]
    async fn test_start_returns_hosted_url() {
        let provider = Arc::new(MockPaymentProvider::new());
        let started = initiator(&provider)
            .start(Some("price_solo_monthly_ach"), Some("user_42"))
            .await
            .unwrap();

        assert!(started.id.starts_with("cs_"));
        assert!(!started.url.is_empty());

        let session = provider.session(&started.id).unwrap();
        assert_eq!(session.client_reference.as_deref(), Some("uid=user_42"));
    }

    #[tokio::test]
    async fn test_missing_fields_make_no_provider_call() {
        let provider = Arc::new(MockPaymentProvider::new());
        let initiator = initiator(&provider);

        for (price, user) in [(None, Some("u1")), (Some("price_x"), None), (Some("  "), Some("u1"))] {
            let err = initiator.start(price, user).await.unwrap_err();
            assert!(matches!(err, BillingError::Validation(_)));
        }
        let err = initiator.start_for_email(Some("price_x"), None, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_surfaces() {
        let provider = Arc::new(MockPaymentProvider::new());
        provider.fail_on("create_checkout_session", "No such price: 'price_bogus'");

        let err = initiator(&provider)
            .start(Some("price_bogus"), Some("user_1"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("No such price"));
        assert_eq!(provider.call_count("create_checkout_session"), 1);
    }

    #[test]
    fn test_catalog_price_restricts_payment_method() {
        let provider = Arc::new(MockPaymentProvider::new());
        let initiator = initiator(&provider);

        let known = initiator.base_request("price_clinic_annual_ach", "https://x");
        assert_eq!(known.payment_method, Some(PaymentMethod::Ach));

        let unknown = initiator.base_request("price_1Pz", "https://x");
        assert_eq!(unknown.payment_method, None);
    }

    #[tokio::test]
    async fn test_email_variant_uses_verify_route() {
        let provider = Arc::new(MockPaymentProvider::new());
        let mut metadata = HashMap::new();
        metadata.insert("clinicName".to_string(), "Northside Physio".to_string());

        let started = initiator(&provider)
            .start_for_email(Some("price_clinic_monthly_card"), Some("owner@northside.test"), metadata)
            .await
            .unwrap();

        let session = provider.session(&started.id).unwrap();
        assert_eq!(session.customer_email.as_deref(), Some("owner@northside.test"));
        assert_eq!(session.metadata["clinicName"], "Northside Physio");
        assert!(session.client_reference.is_none());
    }

    #[tokio::test]
    async fn test_success_redirect_carries_subscription() {
        let provider = Arc::new(MockPaymentProvider::new());
        paid_session(&provider, "uid=42");

        let url = success_handler(&provider).redirect_target(Some("cs_test_a1")).await;

        assert!(url.starts_with("https://clinics.example.org/membership/confirmation?"));
        assert!(url.contains("paid=active"));
        assert!(url.contains("uid=42"));
        assert!(url.contains("session=cs_test_a1"));
        assert!(url.contains("subscription=sub_1NQ"));
        assert!(url.contains("end_date=2023-11-14T22:13:20.000Z"));
    }

    #[tokio::test]
    async fn test_success_handler_is_repeatable() {
        let provider = Arc::new(MockPaymentProvider::new());
        paid_session(&provider, "uid=42");
        let handler = success_handler(&provider);

        let first = handler.redirect_target(Some("cs_test_a1")).await;
        let second = handler.redirect_target(Some("cs_test_a1")).await;
        assert_eq!(first, second);
        assert_eq!(provider.call_count("cancel_at_period_end"), 0);
    }

    #[tokio::test]
    async fn test_failures_redirect_to_cancel_route() {
        let provider = Arc::new(MockPaymentProvider::new());
        let handler = success_handler(&provider);
        let cancel = routes().cancel_url;

        assert_eq!(handler.redirect_target(None).await, cancel);
        assert_eq!(handler.redirect_target(Some("cs_missing")).await, cancel);

        provider.insert_session(CheckoutSession {
            id: "cs_unpaid".into(),
            url: None,
            client_reference: Some("uid=1".into()),
            subscription_id: None,
            payment_status: PaymentStatus::Unpaid,
            customer_email: None,
            metadata: HashMap::new(),
        });
        assert_eq!(handler.redirect_target(Some("cs_unpaid")).await, cancel);
    }

    #[tokio::test]
    async fn test_unsigned_reference_rejected_by_signed_codec() {
        let provider = Arc::new(MockPaymentProvider::new());
        paid_session(&provider, "uid=42");
        let handler =
            CheckoutSuccessHandler::new(provider.clone(), ClientReferenceCodec::signed("k"), routes());

        let err = handler.confirm(Some("cs_test_a1")).await.unwrap_err();
        assert!(matches!(err, BillingError::ClientReference(_)));
    }

    #[test]
    fn test_query_values_are_escaped() {
        let confirmation = Confirmation {
            status: "active".into(),
            user_id: "a b&c".into(),
            session_id: "cs_1".into(),
            subscription_id: "sub_1".into(),
            end_date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let url = confirmation.redirect_url("https://x.test/done");
        assert!(url.contains("uid=a%20b%26c&"));
        assert!(url.ends_with("&end_date=2023-11-14T22:13:20.000Z"));
    }

    #[tokio::test]
    async fn test_verify_requires_paid_session() {
        let provider = Arc::new(MockPaymentProvider::new());
        let verifier = SessionVerifier::new(provider.clone());

        let started = initiator(&provider)
            .start(Some("price_solo_annual_card"), Some("user_5"))
            .await
            .unwrap();

        let err = verifier.verify(Some(started.id.as_str())).await.unwrap_err();
        assert!(matches!(err, BillingError::PaymentIncomplete(_)));

        let sub_id = provider.complete_session(&started.id, 365).unwrap();
        let verification = verifier.verify(Some(started.id.as_str())).await.unwrap();
        assert!(verification.success);
        assert_eq!(verification.subscription.unwrap().id, sub_id);
    }
}

//! Application State

use std::sync::Arc;

use clinic_billing::{
    CheckoutInitiator, CheckoutRoutes, CheckoutSuccessHandler, ClientReferenceCodec, PaymentProvider,
    PlanCatalog, SessionVerifier, SubscriptionCanceler, UserRecordStore,
};

/// Checkout services sharing one payment provider
pub struct Billing {
    pub provider_name: String,
    pub initiator: CheckoutInitiator,
    pub success: CheckoutSuccessHandler,
    pub verifier: SessionVerifier,
    pub canceler: SubscriptionCanceler,
}

impl Billing {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        records: Arc<dyn UserRecordStore>,
        catalog: Arc<PlanCatalog>,
        codec: ClientReferenceCodec,
        routes: CheckoutRoutes,
    ) -> Self {
        Self {
            provider_name: provider.name().to_string(),
            initiator: CheckoutInitiator::new(provider.clone(), catalog, codec.clone(), routes.clone()),
            success: CheckoutSuccessHandler::new(provider.clone(), codec, routes),
            verifier: SessionVerifier::new(provider.clone()),
            canceler: SubscriptionCanceler::new(provider, records),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Plan catalog served to the plan selector
    pub catalog: Arc<PlanCatalog>,

    /// User subscription records
    pub records: Arc<dyn UserRecordStore>,

    /// Redirect targets, needed even when payments are disabled
    pub routes: CheckoutRoutes,

    /// Checkout services (optional - None if Stripe is not configured)
    pub billing: Option<Arc<Billing>>,
}

//! # clinic-billing
//!
//! Membership checkout for the clinic directory: plan catalog, Stripe
//! subscription checkout, success verification and cancellation.
//!
//! ## Flow
//!
//! ```text
//! PlanCatalog ──▶ CheckoutInitiator ──▶ Stripe hosted page ──▶ CheckoutSuccessHandler ──▶ confirmation route
//!
//! SubscriptionCanceler ──▶ Stripe (cancel at period end) ──▶ UserRecordStore
//! ```
//!
//! Stripe is the source of truth. The user record is a best-effort mirror and
//! is only written on cancellation; nothing here records activation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clinic_billing::{
//!     CheckoutInitiator, CheckoutRoutes, ClientReferenceCodec, PlanCatalog, StripeProvider,
//! };
//!
//! let provider = Arc::new(StripeProvider::from_env()?);
//! let initiator = CheckoutInitiator::new(
//!     provider,
//!     Arc::new(PlanCatalog::standard()),
//!     ClientReferenceCodec::from_env(),
//!     CheckoutRoutes::from_site_url("https://clinics.example.org"),
//! );
//!
//! let started = initiator.start(Some("price_clinic_monthly_ach"), Some("user_42")).await?;
//! // Redirect member to: started.url
//! ```

mod cancel;
mod catalog;
mod checkout;
mod correlation;
mod error;
pub mod provider;
pub mod records;

pub use cancel::{Cancellation, SubscriptionCanceler};
pub use catalog::{BillingInterval, MembershipTier, PaymentMethod, Plan, PlanCatalog};
pub use checkout::{
    CheckoutInitiator, CheckoutRoutes, CheckoutSuccessHandler, Confirmation, SESSION_PLACEHOLDER,
    SessionVerifier, StartedCheckout, Verification,
};
pub use correlation::ClientReferenceCodec;
#[cfg(feature = "axum-handlers")]
pub use error::ErrorBody;
pub use error::{BillingError, Result};
pub use provider::{MockPaymentProvider, PaymentProvider, StripeProvider, Subscription, SubscriptionStatus};
pub use records::{
    MemoryUserStore, PostgrestConfig, PostgrestUserStore, SubscriptionUpdate, UserRecord, UserRecordStore,
};

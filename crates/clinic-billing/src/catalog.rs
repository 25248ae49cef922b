//! Membership Plan Catalog
//!
//! Static mapping from (tier, interval, payment method) to a Stripe price
//! reference and the amount shown on the plan selector.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Card payments carry the processing fee on top of the ACH base amount
const CARD_SURCHARGE: Decimal = dec!(1.035);

/// Membership tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Clinic,
    Solo,
    Affiliate,
}

impl MembershipTier {
    pub const ALL: [Self; 3] = [Self::Clinic, Self::Solo, Self::Affiliate];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clinic => "clinic",
            Self::Solo => "solo",
            Self::Affiliate => "affiliate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clinic" => Some(Self::Clinic),
            "solo" => Some(Self::Solo),
            "affiliate" => Some(Self::Affiliate),
            _ => None,
        }
    }
}

/// Billing interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Annual,
}

impl BillingInterval {
    pub const ALL: [Self; 2] = [Self::Monthly, Self::Annual];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Some(Self::Monthly),
            "annual" | "yearly" | "year" => Some(Self::Annual),
            _ => None,
        }
    }
}

/// How the member pays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Ach,
    Card,
}

impl PaymentMethod {
    pub const ALL: [Self; 2] = [Self::Ach, Self::Card];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ach => "ach",
            Self::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ach" | "bank" => Some(Self::Ach),
            "card" => Some(Self::Card),
            _ => None,
        }
    }
}

/// A purchasable membership plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub membership_tier: MembershipTier,
    pub interval: BillingInterval,
    pub payment_method: PaymentMethod,
    /// Stripe price ID
    pub price_ref: String,
    /// Amount in USD shown to the member
    pub display_amount: Decimal,
}

impl Plan {
    fn standard(tier: MembershipTier, interval: BillingInterval, method: PaymentMethod) -> Self {
        let base = base_amount(tier, interval);
        let display_amount = match method {
            PaymentMethod::Ach => base,
            PaymentMethod::Card => (base * CARD_SURCHARGE).round_dp(2),
        };

        Self {
            membership_tier: tier,
            interval,
            payment_method: method,
            price_ref: default_price_ref(tier, interval, method),
            display_amount,
        }
    }

    /// Environment variable that overrides this plan's price reference
    pub fn price_env_var(&self) -> String {
        format!(
            "STRIPE_PRICE_{}_{}_{}",
            self.membership_tier.as_str(),
            self.interval.as_str(),
            self.payment_method.as_str()
        )
        .to_uppercase()
    }
}

/// ACH amount for a tier and interval
fn base_amount(tier: MembershipTier, interval: BillingInterval) -> Decimal {
    match (tier, interval) {
        (MembershipTier::Clinic, BillingInterval::Monthly) => dec!(100),
        (MembershipTier::Clinic, BillingInterval::Annual) => dec!(1000),
        (MembershipTier::Solo, BillingInterval::Monthly) => dec!(50),
        (MembershipTier::Solo, BillingInterval::Annual) => dec!(500),
        (MembershipTier::Affiliate, BillingInterval::Monthly) => dec!(30),
        (MembershipTier::Affiliate, BillingInterval::Annual) => dec!(300),
    }
}

fn default_price_ref(tier: MembershipTier, interval: BillingInterval, method: PaymentMethod) -> String {
    format!("price_{}_{}_{}", tier.as_str(), interval.as_str(), method.as_str())
}

/// The full set of plans
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl PlanCatalog {
    /// Catalog with the built-in amounts and default price references
    pub fn standard() -> Self {
        let mut plans = Vec::with_capacity(12);
        for tier in MembershipTier::ALL {
            for interval in BillingInterval::ALL {
                for method in PaymentMethod::ALL {
                    plans.push(Plan::standard(tier, interval, method));
                }
            }
        }
        Self { plans }
    }

    /// Replace price references from a lookup (usually the environment).
    ///
    /// Amounts never change; only the Stripe price ID does.
    pub fn with_price_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for plan in &mut self.plans {
            if let Some(price_ref) = lookup(&plan.price_env_var()).filter(|p| !p.trim().is_empty()) {
                tracing::debug!(
                    tier = plan.membership_tier.as_str(),
                    interval = plan.interval.as_str(),
                    method = plan.payment_method.as_str(),
                    price_ref = %price_ref,
                    "Overriding plan price reference"
                );
                plan.price_ref = price_ref;
            }
        }
        self
    }

    /// Look up a plan by its three selectors
    pub fn lookup(
        &self,
        tier: MembershipTier,
        interval: BillingInterval,
        method: PaymentMethod,
    ) -> Option<&Plan> {
        self.plans.iter().find(|p| {
            p.membership_tier == tier && p.interval == interval && p.payment_method == method
        })
    }

    /// Reverse lookup by Stripe price ID
    pub fn by_price_ref(&self, price_ref: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.price_ref == price_ref)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

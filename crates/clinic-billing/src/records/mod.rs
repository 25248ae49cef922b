//! User Subscription Records
//!
//! The application database mirrors each member's subscription state so the
//! site can gate submission flows without calling Stripe.

mod memory;
mod postgrest;

pub use memory::MemoryUserStore;
pub use postgrest::{PostgrestConfig, PostgrestUserStore};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::SubscriptionStatus;

/// A member's row in the user table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Auth provider user ID
    pub auth_id: String,

    #[serde(default)]
    pub subscription_id: Option<String>,

    #[serde(default)]
    pub subscription_status: Option<SubscriptionStatus>,

    /// When a canceled membership stops granting access
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(auth_id: impl Into<String>) -> Self {
        Self {
            auth_id: auth_id.into(),
            subscription_id: None,
            subscription_status: None,
            canceled_at: None,
        }
    }

    /// Whether the member may use submission flows at `now`.
    ///
    /// A canceled membership keeps access until the paid period runs out.
    pub fn has_access_at(&self, now: DateTime<Utc>) -> bool {
        match self.subscription_status {
            Some(SubscriptionStatus::Active | SubscriptionStatus::Trialing) => true,
            Some(SubscriptionStatus::Canceled) => self.canceled_at.is_some_and(|end| now < end),
            _ => false,
        }
    }

    pub fn has_access(&self) -> bool {
        self.has_access_at(Utc::now())
    }

    /// `canceledAt` as ISO-8601 UTC with milliseconds
    pub fn canceled_at_iso(&self) -> Option<String> {
        self.canceled_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub(crate) fn apply(&mut self, update: &SubscriptionUpdate) {
        if let Some(ref id) = update.subscription_id {
            self.subscription_id = Some(id.clone());
        }
        self.subscription_status = Some(update.subscription_status);
        self.canceled_at = update.canceled_at;
    }
}

/// Subscription fields written after a state-changing provider call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl SubscriptionUpdate {
    /// Cancellation scheduled for the end of the period
    pub const fn canceled(canceled_at: Option<DateTime<Utc>>) -> Self {
        Self {
            subscription_id: None,
            subscription_status: SubscriptionStatus::Canceled,
            canceled_at,
        }
    }
}

/// User record storage trait
#[async_trait]
pub trait UserRecordStore: Send + Sync {
    /// Get a record by auth ID
    async fn get(&self, auth_id: &str) -> Result<Option<UserRecord>>;

    /// Write subscription fields on the record keyed by `auth_id`.
    ///
    /// Fails with a storage error when no record matches.
    async fn update_subscription(&self, auth_id: &str, update: SubscriptionUpdate) -> Result<()>;

    /// Store name for logs and health output
    fn name(&self) -> &str;
}

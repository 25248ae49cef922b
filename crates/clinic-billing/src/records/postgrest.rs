//! PostgREST User Record Store
//!
//! Reads and patches the user table through a PostgREST endpoint
//! (`<url>/rest/v1/<table>`), authenticated with a service key.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};

use super::{SubscriptionUpdate, UserRecord, UserRecordStore};
use crate::error::{BillingError, Result};

/// PostgREST connection settings
#[derive(Clone, Debug)]
pub struct PostgrestConfig {
    /// Project URL, without the `/rest/v1` suffix
    pub url: String,

    /// Service key sent as `apikey` and bearer token
    pub service_key: String,

    /// User table name
    pub table: String,
}

impl PostgrestConfig {
    /// Read `RECORD_STORE_URL`, `RECORD_STORE_KEY` and `RECORD_STORE_TABLE`
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("RECORD_STORE_URL")
            .map_err(|_| BillingError::Config("RECORD_STORE_URL not set".into()))?;
        let service_key = std::env::var("RECORD_STORE_KEY")
            .map_err(|_| BillingError::Config("RECORD_STORE_KEY not set".into()))?;
        let table = std::env::var("RECORD_STORE_TABLE").unwrap_or_else(|_| "users".into());

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            table,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

pub struct PostgrestUserStore {
    client: Client,
    config: PostgrestConfig,
}

impl PostgrestUserStore {
    pub fn new(config: PostgrestConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Use a preconfigured HTTP client (timeouts, proxies)
    pub fn with_client(client: Client, config: PostgrestConfig) -> Self {
        Self { client, config }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(PostgrestConfig::from_env()?))
    }

    /// Base request filtered to one user
    fn scoped(&self, builder: RequestBuilder, auth_id: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .query(&[("authId", format!("eq.{auth_id}"))])
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<UserRecord>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Storage(format!("record store returned {status}: {body}")));
        }

        response
            .json::<Vec<UserRecord>>()
            .await
            .map_err(|e| BillingError::Storage(format!("invalid record store response: {e}")))
    }
}

#[async_trait]
impl UserRecordStore for PostgrestUserStore {
    async fn get(&self, auth_id: &str) -> Result<Option<UserRecord>> {
        let request = self
            .scoped(self.client.get(self.config.table_url()), auth_id)
            .query(&[("select", "*"), ("limit", "1")]);

        let response = request
            .send()
            .await
            .map_err(|e| BillingError::Storage(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Self::read_rows(response).await?.into_iter().next())
    }

    async fn update_subscription(&self, auth_id: &str, update: SubscriptionUpdate) -> Result<()> {
        let request = self
            .scoped(self.client.patch(self.config.table_url()), auth_id)
            .header("Prefer", "return=representation")
            .json(&update);

        let response = request
            .send()
            .await
            .map_err(|e| BillingError::Storage(e.to_string()))?;

        let rows = Self::read_rows(response).await?;
        if rows.is_empty() {
            return Err(BillingError::Storage(format!("no user record for {auth_id}")));
        }

        tracing::debug!(auth_id = %auth_id, rows = rows.len(), "Patched user subscription fields");
        Ok(())
    }

    fn name(&self) -> &str {
        "postgrest"
    }
}

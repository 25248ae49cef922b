//! In-memory user record store (for development and tests)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SubscriptionUpdate, UserRecord, UserRecordStore};
use crate::error::{BillingError, Result};

pub struct MemoryUserStore {
    records: RwLock<HashMap<String, UserRecord>>,
    updates: AtomicUsize,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            updates: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a record
    pub async fn insert(&self, record: UserRecord) {
        self.records
            .write()
            .await
            .insert(record.auth_id.clone(), record);
    }

    /// Number of successful `update_subscription` calls
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRecordStore for MemoryUserStore {
    async fn get(&self, auth_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.records.read().await.get(auth_id).cloned())
    }

    async fn update_subscription(&self, auth_id: &str, update: SubscriptionUpdate) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(auth_id)
            .ok_or_else(|| BillingError::Storage(format!("no user record for {auth_id}")))?;

        record.apply(&update);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

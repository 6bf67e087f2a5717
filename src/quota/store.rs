//! Custom Limit Store
//!
//! Persisted per-org and per-user limit overrides. The engine only sees the
//! [`CustomLimitStore`] trait; [`InMemoryLimitStore`] backs tests and tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::model::Limits;
use super::scope::{Scope, ScopeParameters, Target};

/// Key-value store of custom limit overrides
#[async_trait]
pub trait CustomLimitStore: Send + Sync {
    /// Overrides visible to the given owners: org-owned entries land in the
    /// `org` scope, user-owned entries in the `user` scope.
    async fn get_custom_limits(&self, params: &ScopeParameters) -> anyhow::Result<Limits>;

    /// Insert or replace the override for one owner and target
    async fn set_custom_limit(
        &self,
        target: &Target,
        owner: &ScopeParameters,
        limit: i64,
    ) -> anyhow::Result<()>;

    /// Remove every override owned by the user
    async fn delete_by_user(&self, user_id: i64) -> anyhow::Result<()>;
}

/// Key for identifying a stored override
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LimitKey {
    pub org_id: i64,
    pub user_id: i64,
    pub target: Target,
}

impl LimitKey {
    pub fn new(owner: &ScopeParameters, target: Target) -> Self {
        Self {
            org_id: owner.org_id,
            user_id: owner.user_id,
            target,
        }
    }
}

/// Stored override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRecord {
    pub key: LimitKey,

    pub limit: i64,

    pub created: chrono::DateTime<chrono::Utc>,

    pub updated: chrono::DateTime<chrono::Utc>,
}

/// In-memory custom limit store
#[derive(Debug, Clone, Default)]
pub struct InMemoryLimitStore {
    records: Arc<RwLock<HashMap<LimitKey, LimitRecord>>>,
}

impl InMemoryLimitStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored override if it exists
    pub async fn get(&self, key: &LimitKey) -> Option<LimitRecord> {
        let records = self.records.read().await;
        records.get(key).cloned()
    }

    /// All stored overrides
    pub async fn all_records(&self) -> Vec<LimitRecord> {
        let records = self.records.read().await;
        records.values().cloned().collect()
    }

    /// Number of stored overrides
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Remove all overrides
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl CustomLimitStore for InMemoryLimitStore {
    async fn get_custom_limits(&self, params: &ScopeParameters) -> anyhow::Result<Limits> {
        let records = self.records.read().await;
        let mut limits = Limits::new();

        for record in records.values() {
            let key = &record.key;
            let scope = if params.org_id != 0 && key.org_id == params.org_id && key.user_id == 0 {
                Scope::Org
            } else if params.user_id != 0 && key.user_id == params.user_id && key.org_id == 0 {
                Scope::User
            } else {
                continue;
            };

            limits
                .entry(key.target.clone())
                .or_default()
                .insert(scope, record.limit);
        }

        Ok(limits)
    }

    async fn set_custom_limit(
        &self,
        target: &Target,
        owner: &ScopeParameters,
        limit: i64,
    ) -> anyhow::Result<()> {
        if owner.org_id != 0 && owner.user_id != 0 {
            anyhow::bail!("Custom limit owner must be an org or a user, not both");
        }

        let key = LimitKey::new(owner, target.clone());
        let now = chrono::Utc::now();

        let mut records = self.records.write().await;
        records
            .entry(key.clone())
            .and_modify(|r| {
                r.limit = limit;
                r.updated = now;
            })
            .or_insert(LimitRecord {
                key,
                limit,
                created: now,
                updated: now,
            });

        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> anyhow::Result<()> {
        // user_id 0 marks org-owned records
        if user_id == 0 {
            return Ok(());
        }
        let mut records = self.records.write().await;
        records.retain(|key, _| key.user_id != user_id);
        Ok(())
    }
}

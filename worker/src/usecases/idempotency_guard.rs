use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::idempotency_keys::IdempotencyKeyEntity,
    repositories::idempotency_keys::IdempotencyKeyRepository,
    value_objects::{
        admin::ExpiredKeysSummary,
        idempotency::{IdempotentOperation, ReserveOutcome},
    },
};
use tracing::{debug, info};

/// Key/operation/expiry reservations in front of side-effecting operations.
///
/// A reservation that is never completed (crash mid-operation) stays live until
/// `expires_at`; nothing releases it early.
pub struct IdempotencyGuard {
    repository: Arc<dyn IdempotencyKeyRepository + Send + Sync>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(repository: Arc<dyn IdempotencyKeyRepository + Send + Sync>, ttl: Duration) -> Self {
        Self { repository, ttl }
    }

    pub async fn reserve(
        &self,
        operation: IdempotentOperation,
        target: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, ReserveOutcome)> {
        let key = operation.key_for(target);
        let outcome = self
            .repository
            .reserve(IdempotencyKeyEntity {
                key: key.clone(),
                operation: operation.to_string(),
                response_payload: None,
                created_at: now,
                expires_at: now + self.ttl,
            })
            .await?;

        debug!(key = %key, outcome = ?outcome, "idempotency: reserve");
        Ok((key, outcome))
    }

    pub async fn exists_and_live(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .repository
            .find_live(key.to_string(), now)
            .await?
            .is_some())
    }

    pub async fn attach_result(&self, key: &str, payload: serde_json::Value) -> Result<()> {
        self.repository.attach_result(key.to_string(), payload).await
    }

    pub async fn expired(&self, now: DateTime<Utc>, limit: i64) -> Result<ExpiredKeysSummary> {
        let expired = self.repository.count_expired(now).await?;
        let keys = self.repository.list_expired(now, limit).await?;
        Ok(ExpiredKeysSummary { now, expired, keys })
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let deleted = self.repository.purge_expired(now).await?;
        info!(deleted, "idempotency: purged expired keys");
        Ok(deleted)
    }
}

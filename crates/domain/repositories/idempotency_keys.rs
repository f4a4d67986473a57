use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::{
    entities::idempotency_keys::IdempotencyKeyEntity,
    value_objects::idempotency::ReserveOutcome,
};

#[automock]
#[async_trait]
pub trait IdempotencyKeyRepository {
    /// Inserts the key unless a live row holds it. An expired row for the same key is
    /// replaced. The unique constraint on `key` decides the winner of concurrent calls.
    async fn reserve(&self, key_entity: IdempotencyKeyEntity) -> Result<ReserveOutcome>;
    async fn find_live(&self, key: String, now: DateTime<Utc>)
    -> Result<Option<IdempotencyKeyEntity>>;
    async fn attach_result(&self, key: String, response_payload: serde_json::Value) -> Result<()>;
    async fn count_expired(&self, now: DateTime<Utc>) -> Result<i64>;
    async fn list_expired(&self, now: DateTime<Utc>, limit: i64)
    -> Result<Vec<IdempotencyKeyEntity>>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

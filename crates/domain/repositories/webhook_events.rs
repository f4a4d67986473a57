use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity};

#[automock]
#[async_trait]
pub trait WebhookEventRepository {
    async fn find_by_event_id(&self, event_id: String) -> Result<Option<WebhookEventEntity>>;
    /// Returns `false` when the event id is already stored.
    async fn insert(&self, insert_event_entity: InsertWebhookEventEntity) -> Result<bool>;
    async fn mark_processed(&self, event_id: String, processed_at: DateTime<Utc>) -> Result<()>;
    async fn reset_processed(&self, event_id: String) -> Result<()>;
    /// Marks every unprocessed event carrying this (sale, payment) pair as processed.
    async fn mark_processed_for_payment(
        &self,
        sale_id: String,
        payment_ref: String,
        processed_at: DateTime<Utc>,
    ) -> Result<usize>;
    async fn count_by_types_between(
        &self,
        event_types: Vec<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payment_postings::{InsertPaymentPostingEntity, PaymentPostingEntity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingCounts {
    pub posted: i64,
    pub unposted: i64,
}

#[automock]
#[async_trait]
pub trait PaymentPostingRepository {
    async fn find_by_id(&self, posting_id: Uuid) -> Result<Option<PaymentPostingEntity>>;
    async fn find_by_sale_and_payment(
        &self,
        sale_id: String,
        payment_ref: String,
    ) -> Result<Option<PaymentPostingEntity>>;
    /// `None` when a row for the (sale, payment) pair already exists.
    async fn insert(
        &self,
        insert_posting_entity: InsertPaymentPostingEntity,
    ) -> Result<Option<PaymentPostingEntity>>;
    /// Takes the right to post a row. `None` when another caller holds a claim newer
    /// than `stale_before`, or when the row is already posted and `include_posted` is off.
    async fn claim(
        &self,
        posting_id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        include_posted: bool,
    ) -> Result<Option<PaymentPostingEntity>>;
    async fn release_claim(&self, posting_id: Uuid) -> Result<()>;
    /// Also clears the claim.
    async fn mark_posted(
        &self,
        posting_id: Uuid,
        response_payload: serde_json::Value,
        posted_at: DateTime<Utc>,
    ) -> Result<PaymentPostingEntity>;
    async fn list_unposted(&self, limit: i64, offset: i64) -> Result<Vec<PaymentPostingEntity>>;
    async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>)
    -> Result<PostingCounts>;
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{OptionalExtension, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::{PgPoolSquad, checkout},
        schema::payment_postings,
    },
};
use domain::{
    entities::payment_postings::{InsertPaymentPostingEntity, PaymentPostingEntity},
    repositories::payment_postings::{PaymentPostingRepository, PostingCounts},
};

pub struct PaymentPostingPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostingPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentPostingRepository for PaymentPostingPostgres {
    async fn find_by_id(&self, posting_id: Uuid) -> Result<Option<PaymentPostingEntity>> {
        let mut conn = checkout(&self.db_pool, "payment_postings.find_by_id")?;

        let result = payment_postings::table
            .find(posting_id)
            .select(PaymentPostingEntity::as_select())
            .first::<PaymentPostingEntity>(&mut conn)
            .optional()
            .with_context(|| format!("failed to load payment posting {posting_id}"))?;

        Ok(result)
    }

    async fn find_by_sale_and_payment(
        &self,
        sale_id: String,
        payment_ref: String,
    ) -> Result<Option<PaymentPostingEntity>> {
        let mut conn = checkout(&self.db_pool, "payment_postings.find_by_sale_and_payment")?;

        let result = payment_postings::table
            .filter(payment_postings::sale_id.eq(&sale_id))
            .filter(payment_postings::payment_intent_id.eq(&payment_ref))
            .select(PaymentPostingEntity::as_select())
            .first::<PaymentPostingEntity>(&mut conn)
            .optional()
            .with_context(|| {
                format!("failed to load posting for sale {sale_id} payment {payment_ref}")
            })?;

        Ok(result)
    }

    async fn insert(
        &self,
        insert_posting_entity: InsertPaymentPostingEntity,
    ) -> Result<Option<PaymentPostingEntity>> {
        let mut conn = checkout(&self.db_pool, "payment_postings.insert")?;

        let result = insert_into(payment_postings::table)
            .values(&insert_posting_entity)
            .on_conflict((
                payment_postings::sale_id,
                payment_postings::payment_intent_id,
            ))
            .do_nothing()
            .returning(PaymentPostingEntity::as_select())
            .get_result::<PaymentPostingEntity>(&mut conn)
            .optional()
            .with_context(|| {
                format!(
                    "failed to insert posting for sale {} payment {}",
                    insert_posting_entity.sale_id, insert_posting_entity.payment_intent_id
                )
            })?;

        Ok(result)
    }

    async fn claim(
        &self,
        posting_id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        include_posted: bool,
    ) -> Result<Option<PaymentPostingEntity>> {
        let mut conn = checkout(&self.db_pool, "payment_postings.claim")?;

        let claimable = payment_postings::id.eq(posting_id).and(
            payment_postings::claimed_at
                .is_null()
                .or(payment_postings::claimed_at.lt(stale_before)),
        );
        let changes = (
            payment_postings::claimed_at.eq(Some(claimed_at)),
            payment_postings::updated_at.eq(claimed_at),
        );

        let result = if include_posted {
            update(payment_postings::table.filter(claimable))
                .set(changes)
                .returning(PaymentPostingEntity::as_select())
                .get_result::<PaymentPostingEntity>(&mut conn)
                .optional()
        } else {
            update(
                payment_postings::table
                    .filter(claimable)
                    .filter(payment_postings::posted.eq(false)),
            )
            .set(changes)
            .returning(PaymentPostingEntity::as_select())
            .get_result::<PaymentPostingEntity>(&mut conn)
            .optional()
        }
        .with_context(|| format!("failed to claim payment posting {posting_id}"))?;

        Ok(result)
    }

    async fn release_claim(&self, posting_id: Uuid) -> Result<()> {
        let mut conn = checkout(&self.db_pool, "payment_postings.release_claim")?;

        update(payment_postings::table.find(posting_id))
            .set(payment_postings::claimed_at.eq(None::<DateTime<Utc>>))
            .execute(&mut conn)
            .with_context(|| format!("failed to release claim on payment posting {posting_id}"))?;

        Ok(())
    }

    async fn mark_posted(
        &self,
        posting_id: Uuid,
        response_payload: serde_json::Value,
        posted_at: DateTime<Utc>,
    ) -> Result<PaymentPostingEntity> {
        let mut conn = checkout(&self.db_pool, "payment_postings.mark_posted")?;

        let result = update(payment_postings::table.find(posting_id))
            .set((
                payment_postings::posted.eq(true),
                payment_postings::response_payload.eq(Some(response_payload)),
                payment_postings::posted_at.eq(Some(posted_at)),
                payment_postings::claimed_at.eq(None::<DateTime<Utc>>),
                payment_postings::updated_at.eq(posted_at),
            ))
            .returning(PaymentPostingEntity::as_select())
            .get_result::<PaymentPostingEntity>(&mut conn)
            .with_context(|| format!("failed to mark payment posting {posting_id} posted"))?;

        Ok(result)
    }

    async fn list_unposted(&self, limit: i64, offset: i64) -> Result<Vec<PaymentPostingEntity>> {
        let mut conn = checkout(&self.db_pool, "payment_postings.list_unposted")?;

        let result = payment_postings::table
            .filter(payment_postings::posted.eq(false))
            .order(payment_postings::created_at.asc())
            .limit(limit)
            .offset(offset)
            .select(PaymentPostingEntity::as_select())
            .load::<PaymentPostingEntity>(&mut conn)
            .context("failed to list unposted payments")?;

        Ok(result)
    }

    async fn count_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PostingCounts> {
        let mut conn = checkout(&self.db_pool, "payment_postings.count_between")?;

        let rows = payment_postings::table
            .filter(payment_postings::created_at.ge(from))
            .filter(payment_postings::created_at.lt(to))
            .group_by(payment_postings::posted)
            .select((payment_postings::posted, diesel::dsl::count_star()))
            .load::<(bool, i64)>(&mut conn)
            .context("failed to count payment postings")?;

        let counts = rows
            .into_iter()
            .fold(PostingCounts::default(), |mut acc, (posted, count)| {
                if posted {
                    acc.posted += count;
                } else {
                    acc.unposted += count;
                }
                acc
            });

        Ok(counts)
    }
}

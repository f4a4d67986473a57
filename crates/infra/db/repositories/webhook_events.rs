use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{OptionalExtension, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::{PgPoolSquad, checkout},
        schema::webhook_events,
    },
};
use domain::{
    entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity},
    repositories::webhook_events::WebhookEventRepository,
};

pub struct WebhookEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl WebhookEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WebhookEventRepository for WebhookEventPostgres {
    async fn find_by_event_id(&self, event_id: String) -> Result<Option<WebhookEventEntity>> {
        let mut conn = checkout(&self.db_pool, "webhook_events.find_by_event_id")?;

        let result = webhook_events::table
            .find(&event_id)
            .select(WebhookEventEntity::as_select())
            .first::<WebhookEventEntity>(&mut conn)
            .optional()
            .with_context(|| format!("failed to load webhook event {event_id}"))?;

        Ok(result)
    }

    async fn insert(&self, insert_event_entity: InsertWebhookEventEntity) -> Result<bool> {
        let mut conn = checkout(&self.db_pool, "webhook_events.insert")?;

        let inserted = insert_into(webhook_events::table)
            .values(&insert_event_entity)
            .on_conflict(webhook_events::event_id)
            .do_nothing()
            .execute(&mut conn)
            .with_context(|| {
                format!(
                    "failed to insert webhook event {}",
                    insert_event_entity.event_id
                )
            })?;

        Ok(inserted == 1)
    }

    async fn mark_processed(&self, event_id: String, processed_at: DateTime<Utc>) -> Result<()> {
        let mut conn = checkout(&self.db_pool, "webhook_events.mark_processed")?;

        update(webhook_events::table.find(&event_id))
            .set((
                webhook_events::processed.eq(true),
                webhook_events::processed_at.eq(Some(processed_at)),
            ))
            .execute(&mut conn)
            .with_context(|| format!("failed to mark webhook event {event_id} processed"))?;

        Ok(())
    }

    async fn reset_processed(&self, event_id: String) -> Result<()> {
        let mut conn = checkout(&self.db_pool, "webhook_events.reset_processed")?;

        update(webhook_events::table.find(&event_id))
            .set((
                webhook_events::processed.eq(false),
                webhook_events::processed_at.eq::<Option<DateTime<Utc>>>(None),
            ))
            .execute(&mut conn)
            .with_context(|| format!("failed to reset webhook event {event_id}"))?;

        Ok(())
    }

    async fn mark_processed_for_payment(
        &self,
        sale_id: String,
        payment_ref: String,
        processed_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = checkout(&self.db_pool, "webhook_events.mark_processed_for_payment")?;

        let updated = update(
            webhook_events::table
                .filter(webhook_events::sale_id.eq(&sale_id))
                .filter(
                    webhook_events::payment_intent_id
                        .eq(&payment_ref)
                        .or(webhook_events::charge_id.eq(&payment_ref)),
                )
                .filter(webhook_events::processed.eq(false)),
        )
        .set((
            webhook_events::processed.eq(true),
            webhook_events::processed_at.eq(Some(processed_at)),
        ))
        .execute(&mut conn)
        .with_context(|| {
            format!("failed to close webhook events for sale {sale_id} payment {payment_ref}")
        })?;

        Ok(updated)
    }

    async fn count_by_types_between(
        &self,
        event_types: Vec<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = checkout(&self.db_pool, "webhook_events.count_by_types_between")?;

        let count = webhook_events::table
            .filter(webhook_events::event_type.eq_any(event_types))
            .filter(webhook_events::received_at.ge(from))
            .filter(webhook_events::received_at.lt(to))
            .count()
            .get_result::<i64>(&mut conn)
            .context("failed to count webhook events")?;

        Ok(count)
    }
}

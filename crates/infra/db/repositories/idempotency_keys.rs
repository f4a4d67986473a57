use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{OptionalExtension, delete, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::{PgPoolSquad, checkout},
        schema::idempotency_keys,
    },
};
use domain::{
    entities::idempotency_keys::IdempotencyKeyEntity,
    repositories::idempotency_keys::IdempotencyKeyRepository,
    value_objects::idempotency::ReserveOutcome,
};

pub struct IdempotencyKeyPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl IdempotencyKeyPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl IdempotencyKeyRepository for IdempotencyKeyPostgres {
    async fn reserve(&self, key_entity: IdempotencyKeyEntity) -> Result<ReserveOutcome> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.reserve")?;

        let inserted = conn
            .transaction::<usize, diesel::result::Error, _>(|tx| {
                delete(
                    idempotency_keys::table
                        .filter(idempotency_keys::key.eq(&key_entity.key))
                        .filter(idempotency_keys::expires_at.le(key_entity.created_at)),
                )
                .execute(tx)?;

                insert_into(idempotency_keys::table)
                    .values(&key_entity)
                    .on_conflict(idempotency_keys::key)
                    .do_nothing()
                    .execute(tx)
            })
            .with_context(|| format!("failed to reserve idempotency key {}", key_entity.key))?;

        if inserted == 1 {
            Ok(ReserveOutcome::Reserved)
        } else {
            Ok(ReserveOutcome::AlreadyHeld)
        }
    }

    async fn find_live(
        &self,
        key: String,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyKeyEntity>> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.find_live")?;

        let result = idempotency_keys::table
            .find(&key)
            .filter(idempotency_keys::expires_at.gt(now))
            .select(IdempotencyKeyEntity::as_select())
            .first::<IdempotencyKeyEntity>(&mut conn)
            .optional()
            .with_context(|| format!("failed to load idempotency key {key}"))?;

        Ok(result)
    }

    async fn attach_result(&self, key: String, response_payload: serde_json::Value) -> Result<()> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.attach_result")?;

        update(idempotency_keys::table.find(&key))
            .set(idempotency_keys::response_payload.eq(Some(response_payload)))
            .execute(&mut conn)
            .with_context(|| format!("failed to attach result to idempotency key {key}"))?;

        Ok(())
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.count_expired")?;

        let count = idempotency_keys::table
            .filter(idempotency_keys::expires_at.le(now))
            .count()
            .get_result::<i64>(&mut conn)
            .context("failed to count expired idempotency keys")?;

        Ok(count)
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IdempotencyKeyEntity>> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.list_expired")?;

        let result = idempotency_keys::table
            .filter(idempotency_keys::expires_at.le(now))
            .order(idempotency_keys::expires_at.asc())
            .limit(limit)
            .select(IdempotencyKeyEntity::as_select())
            .load::<IdempotencyKeyEntity>(&mut conn)
            .context("failed to list expired idempotency keys")?;

        Ok(result)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = checkout(&self.db_pool, "idempotency_keys.purge_expired")?;

        let deleted = delete(idempotency_keys::table.filter(idempotency_keys::expires_at.le(now)))
            .execute(&mut conn)
            .context("failed to purge expired idempotency keys")?;

        Ok(deleted)
    }
}

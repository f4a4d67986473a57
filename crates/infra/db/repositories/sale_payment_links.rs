use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::{OptionalExtension, insert_into, prelude::*, update};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::{PgPoolSquad, checkout},
        schema::sale_payment_links,
    },
};
use domain::{
    entities::sale_payment_links::{InsertSalePaymentLinkEntity, SalePaymentLinkEntity},
    repositories::sale_payment_links::SalePaymentLinkRepository,
    value_objects::enums::link_statuses::LinkStatus,
};

pub struct SalePaymentLinkPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SalePaymentLinkPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SalePaymentLinkRepository for SalePaymentLinkPostgres {
    async fn find_by_sale_id(&self, sale_id: String) -> Result<Option<SalePaymentLinkEntity>> {
        let mut conn = checkout(&self.db_pool, "sale_payment_links.find_by_sale_id")?;

        let result = sale_payment_links::table
            .filter(sale_payment_links::sale_id.eq(&sale_id))
            .select(SalePaymentLinkEntity::as_select())
            .first::<SalePaymentLinkEntity>(&mut conn)
            .optional()
            .with_context(|| format!("failed to load payment link for sale {sale_id}"))?;

        Ok(result)
    }

    async fn insert(
        &self,
        insert_link_entity: InsertSalePaymentLinkEntity,
    ) -> Result<Option<SalePaymentLinkEntity>> {
        let mut conn = checkout(&self.db_pool, "sale_payment_links.insert")?;

        let result = insert_into(sale_payment_links::table)
            .values(&insert_link_entity)
            .on_conflict(sale_payment_links::sale_id)
            .do_nothing()
            .returning(SalePaymentLinkEntity::as_select())
            .get_result::<SalePaymentLinkEntity>(&mut conn)
            .optional()
            .with_context(|| {
                format!(
                    "failed to insert payment link for sale {}",
                    insert_link_entity.sale_id
                )
            })?;

        Ok(result)
    }

    async fn update_status(
        &self,
        sale_id: String,
        status: LinkStatus,
        reason: Option<String>,
    ) -> Result<Option<SalePaymentLinkEntity>> {
        let mut conn = checkout(&self.db_pool, "sale_payment_links.update_status")?;

        let result = update(sale_payment_links::table.filter(sale_payment_links::sale_id.eq(&sale_id)))
            .set((
                sale_payment_links::status.eq(status.to_string()),
                sale_payment_links::status_reason.eq(reason),
                sale_payment_links::updated_at.eq(Utc::now()),
            ))
            .returning(SalePaymentLinkEntity::as_select())
            .get_result::<SalePaymentLinkEntity>(&mut conn)
            .optional()
            .with_context(|| format!("failed to set link status {status} for sale {sale_id}"))?;

        Ok(result)
    }
}

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::sale_payment_links::{InsertSalePaymentLinkEntity, SalePaymentLinkEntity},
    value_objects::enums::link_statuses::LinkStatus,
};

#[automock]
#[async_trait]
pub trait SalePaymentLinkRepository {
    async fn find_by_sale_id(&self, sale_id: String) -> Result<Option<SalePaymentLinkEntity>>;
    /// `None` when a link for the sale already exists (unique on `sale_id`).
    async fn insert(
        &self,
        insert_link_entity: InsertSalePaymentLinkEntity,
    ) -> Result<Option<SalePaymentLinkEntity>>;
    async fn update_status(
        &self,
        sale_id: String,
        status: LinkStatus,
        reason: Option<String>,
    ) -> Result<Option<SalePaymentLinkEntity>>;
}

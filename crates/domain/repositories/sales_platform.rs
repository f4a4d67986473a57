use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde_json::Value;

use crate::domain::value_objects::{sale_payments::PostSalePaymentRequest, sales::SaleRecord};

#[automock]
#[async_trait]
pub trait SalesPlatform {
    fn has_credentials(&self) -> bool;
    async fn list_sales(
        &self,
        modified_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SaleRecord>>;
    async fn get_sale(&self, sale_id: String) -> Result<Option<SaleRecord>>;
    async fn update_sale_note(&self, sale_id: String, note: String) -> Result<()>;
    async fn post_payment(&self, request: PostSalePaymentRequest) -> Result<Value>;
}

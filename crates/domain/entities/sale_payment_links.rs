use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::infra::db::postgres::schema::sale_payment_links;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable, Serialize)]
#[diesel(table_name = sale_payment_links)]
pub struct SalePaymentLinkEntity {
    pub id: Uuid,
    pub sale_id: String,
    pub sale_reference: Option<String>,
    pub payment_link_id: String,
    pub payment_link_url: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = sale_payment_links)]
pub struct InsertSalePaymentLinkEntity {
    pub sale_id: String,
    pub sale_reference: Option<String>,
    pub payment_link_id: String,
    pub payment_link_url: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

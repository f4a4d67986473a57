use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payment_postings;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable, Serialize)]
#[diesel(table_name = payment_postings)]
pub struct PaymentPostingEntity {
    pub id: Uuid,
    pub sale_id: String,
    pub payment_intent_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub posted: bool,
    pub response_payload: Option<serde_json::Value>,
    pub posted_at: Option<DateTime<Utc>>,
    /// Set while a caller holds the right to post this row.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = payment_postings)]
pub struct InsertPaymentPostingEntity {
    pub sale_id: String,
    pub payment_intent_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub posted: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

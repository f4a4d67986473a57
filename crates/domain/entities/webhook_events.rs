use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::infra::db::postgres::schema::webhook_events;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable, Serialize)]
#[diesel(table_name = webhook_events, primary_key(event_id))]
pub struct WebhookEventEntity {
    pub event_id: String,
    pub event_type: String,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub sale_id: Option<String>,
    pub sale_reference: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Row written on first sight of an event, before any side effect runs.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct InsertWebhookEventEntity {
    pub event_id: String,
    pub event_type: String,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub sale_id: Option<String>,
    pub sale_reference: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub processed: bool,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::infra::db::postgres::schema::idempotency_keys;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable, Insertable, Serialize)]
#[diesel(table_name = idempotency_keys, primary_key(key))]
pub struct IdempotencyKeyEntity {
    pub key: String,
    pub operation: String,
    pub response_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyKeyEntity {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{
    idempotency_keys::IdempotencyKeyEntity, payment_postings::PaymentPostingEntity,
};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForceRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForceLinkStatusRequest {
    pub status: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub success_events: i64,
    pub posted: i64,
    pub unposted: i64,
    /// posted / success_events, `None` when no success events fell in the range.
    pub posting_ratio: Option<f64>,
}

impl ReconcileReport {
    pub fn new(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        success_events: i64,
        posted: i64,
        unposted: i64,
    ) -> Self {
        let posting_ratio = if success_events > 0 {
            Some(posted as f64 / success_events as f64)
        } else {
            None
        };

        Self {
            from,
            to,
            success_events,
            posted,
            unposted,
            posting_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatusChange {
    pub sale_id: String,
    pub old_status: String,
    pub new_status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Nothing actionable in the event; marked processed.
    NoLinkage,
    /// A previous trigger already posted this payment.
    AlreadyPosted,
    /// Another trigger holds the posting for this payment.
    InFlight,
    Posted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayResult {
    pub event_id: String,
    pub was_processed: bool,
    pub outcome: ProcessOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryResult {
    pub posting: PaymentPostingEntity,
    pub events_closed: usize,
    pub link_marked_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnpostedPage {
    pub items: Vec<PaymentPostingEntity>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiredKeysSummary {
    pub now: DateTime<Utc>,
    pub expired: i64,
    pub keys: Vec<IdempotencyKeyEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeResult {
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let page = Pagination {
            limit: Some(10_000),
            offset: Some(-3),
        };
        assert_eq!(page.limit(), MAX_PAGE_LIMIT);
        assert_eq!(page.offset(), 0);
        assert_eq!(Pagination::default().limit(), DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn ratio_is_absent_without_success_events() {
        let now = Utc::now();
        assert_eq!(ReconcileReport::new(now, now, 0, 0, 0).posting_ratio, None);
        assert_eq!(
            ReconcileReport::new(now, now, 4, 3, 1).posting_ratio,
            Some(0.75)
        );
    }
}

use std::{str::FromStr, sync::Arc};

use chrono::{Duration, Utc};
use crates::domain::{
    entities::sale_payment_links::SalePaymentLinkEntity,
    repositories::{
        payment_postings::PaymentPostingRepository,
        sale_payment_links::SalePaymentLinkRepository, webhook_events::WebhookEventRepository,
    },
    value_objects::{
        admin::{
            ExpiredKeysSummary, ForceLinkStatusRequest, LinkStatusChange, Pagination,
            PurgeResult, ReconcileQuery, ReconcileReport, ReplayResult, RetryResult,
            UnpostedPage,
        },
        enums::link_statuses::LinkStatus,
        payment_webhook::SUCCESS_EVENT_TYPES,
    },
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::usecases::{
    idempotency_guard::IdempotencyGuard,
    payment_posting::{PaymentPoster, PostingOutcome},
    payment_webhook::PaymentWebhookUseCase,
    sync_error::{SyncError, SyncResult},
};

const DEFAULT_RECONCILE_DAYS: i64 = 7;

/// Operator reads and overrides. Everything goes through the same repositories the
/// pipeline uses.
pub struct AdminUseCase {
    events: Arc<dyn WebhookEventRepository + Send + Sync>,
    postings: Arc<dyn PaymentPostingRepository + Send + Sync>,
    links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
    guard: Arc<IdempotencyGuard>,
    poster: Arc<PaymentPoster>,
    webhooks: Arc<PaymentWebhookUseCase>,
}

impl AdminUseCase {
    pub fn new(
        events: Arc<dyn WebhookEventRepository + Send + Sync>,
        postings: Arc<dyn PaymentPostingRepository + Send + Sync>,
        links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
        guard: Arc<IdempotencyGuard>,
        poster: Arc<PaymentPoster>,
        webhooks: Arc<PaymentWebhookUseCase>,
    ) -> Self {
        Self {
            events,
            postings,
            links,
            guard,
            poster,
            webhooks,
        }
    }

    /// Resets the processed flag and runs the side-effect stage again.
    pub async fn replay_event(&self, event_id: &str, force: bool) -> SyncResult<ReplayResult> {
        let event = self
            .events
            .find_by_event_id(event_id.to_string())
            .await?
            .ok_or_else(|| SyncError::not_found("webhook event", event_id))?;

        if event.processed && !force {
            return Err(SyncError::conflict(
                format!("webhook event {event_id} is already processed"),
                json!({
                    "event_id": event.event_id,
                    "processed": event.processed,
                    "processed_at": event.processed_at,
                }),
            ));
        }

        self.events.reset_processed(event.event_id.clone()).await?;
        info!(event_id = %event_id, force, "admin: webhook event replay requested");

        let outcome = self.webhooks.process_event(event_id).await?;

        Ok(ReplayResult {
            event_id: event.event_id,
            was_processed: event.processed,
            outcome,
        })
    }

    pub async fn list_unposted(&self, page: Pagination) -> SyncResult<UnpostedPage> {
        let (limit, offset) = (page.limit(), page.offset());
        let items = self.postings.list_unposted(limit, offset).await?;
        Ok(UnpostedPage {
            items,
            limit,
            offset,
        })
    }

    /// Re-posts an existing row. A failed call changes nothing; a success closes the
    /// linked webhook events and marks the sale's link paid.
    pub async fn retry_posting(&self, posting_id: Uuid, force: bool) -> SyncResult<RetryResult> {
        let posting = self
            .postings
            .find_by_id(posting_id)
            .await?
            .ok_or_else(|| SyncError::not_found("payment posting", posting_id.to_string()))?;

        if posting.posted && !force {
            return Err(SyncError::conflict(
                format!("payment posting {posting_id} is already posted"),
                json!({
                    "posting_id": posting.id,
                    "posted": posting.posted,
                    "posted_at": posting.posted_at,
                }),
            ));
        }

        info!(posting_id = %posting_id, force, "admin: payment posting retry requested");
        let (posting, link_marked_paid) = match self.poster.post_row(posting, force).await? {
            PostingOutcome::Posted {
                posting,
                link_marked_paid,
            } => (posting, link_marked_paid),
            PostingOutcome::AlreadyPosted(posting) => (posting, false),
            PostingOutcome::InFlight(posting) => {
                return Err(SyncError::conflict(
                    format!("payment posting {posting_id} is being posted by another trigger"),
                    json!({
                        "posting_id": posting.id,
                        "posted": posting.posted,
                        "claimed_at": posting.claimed_at,
                    }),
                ));
            }
        };

        let events_closed = match self
            .events
            .mark_processed_for_payment(
                posting.sale_id.clone(),
                posting.payment_intent_id.clone(),
                Utc::now(),
            )
            .await
        {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    posting_id = %posting.id,
                    error = ?err,
                    "admin: posted, but failed to close linked webhook events"
                );
                0
            }
        };

        Ok(RetryResult {
            posting,
            events_closed,
            link_marked_paid,
        })
    }

    pub async fn reconcile(&self, query: ReconcileQuery) -> SyncResult<ReconcileReport> {
        let to = query.to.unwrap_or_else(Utc::now);
        let from = query
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_RECONCILE_DAYS));
        if from >= to {
            return Err(SyncError::validation("`from` must be earlier than `to`"));
        }

        let success_types = SUCCESS_EVENT_TYPES.iter().map(|t| t.to_string()).collect();
        let success_events = self
            .events
            .count_by_types_between(success_types, from, to)
            .await?;
        let counts = self.postings.count_between(from, to).await?;

        Ok(ReconcileReport::new(
            from,
            to,
            success_events,
            counts.posted,
            counts.unposted,
        ))
    }

    pub async fn force_link_status(
        &self,
        sale_id: &str,
        request: ForceLinkStatusRequest,
    ) -> SyncResult<LinkStatusChange> {
        let raw_status = request
            .status
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SyncError::validation("status is required"))?;
        let new_status = LinkStatus::from_str(&raw_status).map_err(SyncError::Validation)?;
        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let current = self
            .links
            .find_by_sale_id(sale_id.to_string())
            .await?
            .ok_or_else(|| SyncError::not_found("payment link", sale_id))?;

        let updated = self
            .links
            .update_status(sale_id.to_string(), new_status, reason.clone())
            .await?
            .ok_or_else(|| SyncError::not_found("payment link", sale_id))?;

        warn!(
            sale_id = %sale_id,
            old_status = %current.status,
            new_status = %updated.status,
            reason = ?reason,
            "admin: payment link status overridden"
        );

        Ok(LinkStatusChange {
            sale_id: updated.sale_id,
            old_status: current.status,
            new_status: updated.status,
            reason,
        })
    }

    pub async fn get_link(&self, sale_id: &str) -> SyncResult<SalePaymentLinkEntity> {
        self.links
            .find_by_sale_id(sale_id.to_string())
            .await?
            .ok_or_else(|| SyncError::not_found("payment link", sale_id))
    }

    pub async fn expired_keys(&self, page: Pagination) -> SyncResult<ExpiredKeysSummary> {
        Ok(self.guard.expired(Utc::now(), page.limit()).await?)
    }

    pub async fn purge_expired_keys(&self) -> SyncResult<PurgeResult> {
        let deleted = self.guard.purge_expired(Utc::now()).await?;
        Ok(PurgeResult { deleted })
    }
}

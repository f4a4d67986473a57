use std::sync::Arc;

use chrono::Utc;
use crates::domain::{
    entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity},
    repositories::{payment_platform::PaymentPlatform, webhook_events::WebhookEventRepository},
    value_objects::{
        admin::ProcessOutcome,
        payment_webhook::{EventKind, PaymentLinkage, PaymentWebhookEvent},
    },
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    metrics::{Counter, SyncMetrics},
    usecases::{
        payment_posting::{PaymentPoster, PostingOutcome},
        sync_error::{SyncError, SyncResult},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored unprocessed; side effects still to run.
    Accepted { event_id: String },
    /// Seen before; nothing to do.
    Duplicate { event_id: String },
}

pub struct PaymentWebhookUseCase {
    payment_platform: Arc<dyn PaymentPlatform + Send + Sync>,
    events: Arc<dyn WebhookEventRepository + Send + Sync>,
    poster: Arc<PaymentPoster>,
    metrics: Arc<SyncMetrics>,
    default_currency: String,
}

impl PaymentWebhookUseCase {
    pub fn new(
        payment_platform: Arc<dyn PaymentPlatform + Send + Sync>,
        events: Arc<dyn WebhookEventRepository + Send + Sync>,
        poster: Arc<PaymentPoster>,
        metrics: Arc<SyncMetrics>,
        default_currency: String,
    ) -> Self {
        Self {
            payment_platform,
            events,
            poster,
            metrics,
            default_currency,
        }
    }

    /// Verifies and records an inbound delivery. The row is written before this returns,
    /// so an acknowledged event is never lost even if processing never runs.
    pub async fn ingest(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> SyncResult<IngestOutcome> {
        let Some(signature_header) = signature_header.filter(|s| !s.trim().is_empty()) else {
            self.metrics.incr(Counter::WebhookSignatureRejected);
            warn!("payment_webhook: missing signature header");
            return Err(SyncError::validation("missing signature header"));
        };

        let event = match self
            .payment_platform
            .verify_webhook(payload, signature_header)
        {
            Ok(event) => event,
            Err(err) => {
                self.metrics.incr(Counter::WebhookSignatureRejected);
                warn!(error = %err, "payment_webhook: signature verification failed");
                return Err(SyncError::validation("invalid webhook signature"));
            }
        };

        if self.events.find_by_event_id(event.id.clone()).await?.is_some() {
            return Ok(self.duplicate(event.id));
        }

        // Keep the body exactly as delivered for audit and replay.
        let payload_json = serde_json::from_slice::<serde_json::Value>(payload)
            .or_else(|_| serde_json::to_value(&event))
            .map_err(|err| SyncError::Internal(anyhow::Error::new(err)))?;
        let inserted = self
            .events
            .insert(to_insert_entity(&event, payload_json))
            .await?;

        if !inserted {
            // A concurrent delivery of the same id won the insert.
            return Ok(self.duplicate(event.id));
        }

        self.metrics.incr(Counter::WebhookEventsReceived);
        info!(
            event_id = %event.id,
            event_type = %event.type_,
            "payment_webhook: event stored"
        );

        Ok(IngestOutcome::Accepted { event_id: event.id })
    }

    /// Runs the side-effect stage off the request path. Failures leave the event
    /// unprocessed for a later replay.
    pub fn spawn_processing(self: &Arc<Self>, event_id: String) -> JoinHandle<()> {
        let usecase = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = usecase.process_event(&event_id).await {
                error!(
                    event_id = %event_id,
                    error = %err,
                    "payment_webhook: processing failed, event left unprocessed"
                );
            }
        })
    }

    pub async fn process_event(&self, event_id: &str) -> SyncResult<ProcessOutcome> {
        let event = self
            .events
            .find_by_event_id(event_id.to_string())
            .await?
            .ok_or_else(|| SyncError::not_found("webhook event", event_id))?;

        match self.apply_side_effects(&event).await {
            Ok(outcome) => {
                self.events
                    .mark_processed(event.event_id.clone(), Utc::now())
                    .await?;
                self.metrics.incr(Counter::WebhookEventsProcessed);
                info!(
                    event_id = %event.event_id,
                    outcome = ?outcome,
                    "payment_webhook: event processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.metrics.incr(Counter::WebhookEventsFailed);
                Err(err)
            }
        }
    }

    async fn apply_side_effects(&self, event: &WebhookEventEntity) -> SyncResult<ProcessOutcome> {
        if !EventKind::parse(&event.event_type).is_success() {
            return Ok(ProcessOutcome::NoLinkage);
        }

        let linkage = PaymentLinkage {
            payment_intent_id: event.payment_intent_id.clone(),
            charge_id: event.charge_id.clone(),
            sale_id: event.sale_id.clone(),
            sale_reference: event.sale_reference.clone(),
            amount_minor: event.amount_minor,
            currency: event.currency.clone(),
        };

        let Some(payment) = linkage.actionable(&self.default_currency) else {
            info!(
                event_id = %event.event_id,
                "payment_webhook: no sale linkage, nothing to post"
            );
            return Ok(ProcessOutcome::NoLinkage);
        };

        match self.poster.post(&payment).await? {
            PostingOutcome::AlreadyPosted(_) => Ok(ProcessOutcome::AlreadyPosted),
            PostingOutcome::InFlight(_) => Ok(ProcessOutcome::InFlight),
            PostingOutcome::Posted { .. } => Ok(ProcessOutcome::Posted),
        }
    }

    fn duplicate(&self, event_id: String) -> IngestOutcome {
        self.metrics.incr(Counter::WebhookEventsDuplicate);
        info!(event_id = %event_id, "payment_webhook: duplicate delivery ignored");
        IngestOutcome::Duplicate { event_id }
    }
}

fn to_insert_entity(
    event: &PaymentWebhookEvent,
    payload: serde_json::Value,
) -> InsertWebhookEventEntity {
    let linkage = event.extract_linkage();
    InsertWebhookEventEntity {
        event_id: event.id.clone(),
        event_type: event.type_.clone(),
        payment_intent_id: linkage.payment_intent_id,
        charge_id: linkage.charge_id,
        sale_id: linkage.sale_id,
        sale_reference: linkage.sale_reference,
        amount_minor: linkage.amount_minor,
        currency: linkage.currency,
        processed: false,
        payload,
        received_at: Utc::now(),
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::sale_payment_links::{InsertSalePaymentLinkEntity, SalePaymentLinkEntity},
    repositories::{
        payment_platform::PaymentPlatform, sale_payment_links::SalePaymentLinkRepository,
        sales_platform::SalesPlatform,
    },
    value_objects::{
        enums::link_statuses::LinkStatus,
        idempotency::{IdempotentOperation, ReserveOutcome},
        payment_links::CreatePaymentLinkRequest,
        sales::SaleRecord,
    },
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    metrics::{Counter, SyncMetrics, Upstream},
    usecases::{
        idempotency_guard::IdempotencyGuard,
        sync_error::{SyncError, SyncResult},
    },
};

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub lookback_days: i64,
    pub batch_size: usize,
    pub eligible_statuses: Vec<String>,
    pub default_currency: String,
    pub link_note_prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaleOutcome {
    LinkCreated(SalePaymentLinkEntity),
    SkippedExistingLink,
    SkippedIneligibleStatus,
    SkippedAlreadyReserved,
    SkippedNonPositiveAmount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Cycle skipped because the sales platform credential is missing.
    pub disabled: bool,
    pub fetched: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SaleDiscoveryUseCase {
    sales: Arc<dyn SalesPlatform + Send + Sync>,
    payment_platform: Arc<dyn PaymentPlatform + Send + Sync>,
    links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
    guard: Arc<IdempotencyGuard>,
    metrics: Arc<SyncMetrics>,
    settings: DiscoverySettings,
}

impl SaleDiscoveryUseCase {
    pub fn new(
        sales: Arc<dyn SalesPlatform + Send + Sync>,
        payment_platform: Arc<dyn PaymentPlatform + Send + Sync>,
        links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
        guard: Arc<IdempotencyGuard>,
        metrics: Arc<SyncMetrics>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            sales,
            payment_platform,
            links,
            guard,
            metrics,
            settings,
        }
    }

    /// One poll: fetch recently modified sales and give each eligible one a payment link.
    /// A failing sale is logged and counted; the rest of the batch still runs.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> SyncResult<CycleSummary> {
        if !self.sales.has_credentials() {
            info!("sale_discovery: sales credentials missing, cycle skipped");
            return Ok(CycleSummary {
                disabled: true,
                ..CycleSummary::default()
            });
        }

        self.metrics.incr(Counter::WorkerCycles);
        let modified_since = now - Duration::days(self.settings.lookback_days);

        let sales = match self
            .sales
            .list_sales(modified_since, self.settings.batch_size)
            .await
        {
            Ok(sales) => {
                self.metrics.outbound(Upstream::Sales, "list_sales", true);
                sales
            }
            Err(err) => {
                self.metrics.outbound(Upstream::Sales, "list_sales", false);
                self.metrics.incr(Counter::WorkerCycleErrors);
                error!(error = ?err, "sale_discovery: failed to list sales");
                return Err(SyncError::Upstream(err));
            }
        };

        let mut summary = CycleSummary {
            fetched: sales.len(),
            ..CycleSummary::default()
        };

        for sale in &sales {
            match self.process_sale(sale, now).await {
                Ok(SaleOutcome::LinkCreated(_)) => summary.processed += 1,
                Ok(_) => summary.skipped += 1,
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        sale_id = %sale.sale_id,
                        error = %err,
                        "sale_discovery: sale failed"
                    );
                }
            }
        }

        self.metrics
            .add(Counter::WorkerSalesProcessed, summary.processed as u64);
        self.metrics
            .add(Counter::WorkerSalesSkipped, summary.skipped as u64);
        self.metrics
            .add(Counter::WorkerSalesFailed, summary.failed as u64);

        info!(
            fetched = summary.fetched,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "sale_discovery: cycle finished"
        );

        Ok(summary)
    }

    pub async fn process_sale(
        &self,
        sale: &SaleRecord,
        now: DateTime<Utc>,
    ) -> SyncResult<SaleOutcome> {
        let sale_id = sale.sale_id.as_str();

        if self.links.find_by_sale_id(sale_id.to_string()).await?.is_some() {
            return Ok(SaleOutcome::SkippedExistingLink);
        }

        if !sale.is_eligible(&self.settings.eligible_statuses) {
            return Ok(SaleOutcome::SkippedIneligibleStatus);
        }

        let (key, reservation) = self
            .guard
            .reserve(IdempotentOperation::CreatePaymentLink, sale_id, now)
            .await?;
        if reservation == ReserveOutcome::AlreadyHeld {
            info!(sale_id = %sale_id, key = %key, "sale_discovery: link creation already in flight");
            return Ok(SaleOutcome::SkippedAlreadyReserved);
        }

        // The reservation stays until it expires; a later cycle retries after that.
        let Some(amount_minor) = sale.payable_amount_minor() else {
            warn!(
                sale_id = %sale_id,
                total = ?sale.total,
                "sale_discovery: payable amount is not positive, skipping"
            );
            return Ok(SaleOutcome::SkippedNonPositiveAmount);
        };

        let currency = sale
            .currency
            .clone()
            .unwrap_or_else(|| self.settings.default_currency.clone());

        let request = CreatePaymentLinkRequest {
            sale_id: sale_id.to_string(),
            sale_reference: sale.reference.clone(),
            amount_minor,
            currency: currency.clone(),
            description: format!("Payment for {}", sale.display_reference()),
        };

        let created = match self.payment_platform.create_payment_link(request).await {
            Ok(created) => {
                self.metrics
                    .outbound(Upstream::PaymentPlatform, "create_payment_link", true);
                created
            }
            Err(err) => {
                self.metrics
                    .outbound(Upstream::PaymentPlatform, "create_payment_link", false);
                return Err(SyncError::Upstream(err));
            }
        };

        let inserted = self
            .links
            .insert(InsertSalePaymentLinkEntity {
                sale_id: sale_id.to_string(),
                sale_reference: sale.reference.clone(),
                payment_link_id: created.id.clone(),
                payment_link_url: created.url.clone(),
                amount_minor,
                currency,
                status: LinkStatus::Pending.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let Some(link) = inserted else {
            warn!(
                sale_id = %sale_id,
                payment_link_id = %created.id,
                "sale_discovery: link row already existed, created link left unused"
            );
            return Ok(SaleOutcome::SkippedExistingLink);
        };

        self.metrics.incr(Counter::PaymentLinksCreated);
        info!(
            sale_id = %sale_id,
            payment_link_id = %link.payment_link_id,
            amount_minor,
            "sale_discovery: payment link created"
        );

        if let Err(err) = self
            .guard
            .attach_result(
                &key,
                json!({ "payment_link_id": link.payment_link_id, "url": link.payment_link_url }),
            )
            .await
        {
            warn!(sale_id = %sale_id, error = ?err, "sale_discovery: failed to cache link on key");
        }

        self.write_back(&link).await;

        Ok(SaleOutcome::LinkCreated(link))
    }

    /// Best effort: the link already exists and stays regardless of the outcome.
    async fn write_back(&self, link: &SalePaymentLinkEntity) {
        let note = format!("{} {}", self.settings.link_note_prefix, link.payment_link_url);
        match self
            .sales
            .update_sale_note(link.sale_id.clone(), note)
            .await
        {
            Ok(()) => self.metrics.outbound(Upstream::Sales, "update_sale_note", true),
            Err(err) => {
                self.metrics
                    .outbound(Upstream::Sales, "update_sale_note", false);
                warn!(
                    sale_id = %link.sale_id,
                    error = ?err,
                    "sale_discovery: failed to write link back to sale"
                );
            }
        }
    }
}

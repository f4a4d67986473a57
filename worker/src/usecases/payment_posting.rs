use std::sync::Arc;

use chrono::{Duration, Utc};
use crates::domain::{
    entities::payment_postings::{InsertPaymentPostingEntity, PaymentPostingEntity},
    repositories::{
        payment_postings::PaymentPostingRepository,
        sale_payment_links::SalePaymentLinkRepository, sales_platform::SalesPlatform,
    },
    value_objects::{
        enums::link_statuses::LinkStatus, payment_webhook::ActionablePayment,
        sale_payments::PostSalePaymentRequest,
    },
};
use tracing::{error, info, warn};

use crate::{
    metrics::{Counter, SyncMetrics, Upstream},
    usecases::sync_error::{SyncError, SyncResult},
};

/// How long a claim blocks other callers before it counts as abandoned.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub enum PostingOutcome {
    Posted {
        posting: PaymentPostingEntity,
        link_marked_paid: bool,
    },
    AlreadyPosted(PaymentPostingEntity),
    /// Another trigger holds the row and is posting it now.
    InFlight(PaymentPostingEntity),
}

/// Result of trying to take a posting row.
enum Claim {
    Held(PaymentPostingEntity),
    /// Refused; carries the row as it currently stands.
    Refused(PaymentPostingEntity),
}

/// Informs the sales platform that a payment arrived, guarded by the unique
/// (sale, payment) posting row. Shared by webhook processing and the admin retry.
///
/// Only the caller holding the row's claim may make the outbound call. Inserting the
/// row takes the claim; resuming an unposted row must take it with a conditional update.
pub struct PaymentPoster {
    postings: Arc<dyn PaymentPostingRepository + Send + Sync>,
    links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
    sales: Arc<dyn SalesPlatform + Send + Sync>,
    metrics: Arc<SyncMetrics>,
    claim_lease: Duration,
}

impl PaymentPoster {
    pub fn new(
        postings: Arc<dyn PaymentPostingRepository + Send + Sync>,
        links: Arc<dyn SalePaymentLinkRepository + Send + Sync>,
        sales: Arc<dyn SalesPlatform + Send + Sync>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            postings,
            links,
            sales,
            metrics,
            claim_lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
        }
    }

    /// Posts a payment once. A new row is inserted already claimed; losing that insert
    /// means another trigger owns the payment. An existing unposted row is resumed only
    /// when its claim can be taken.
    pub async fn post(&self, payment: &ActionablePayment) -> SyncResult<PostingOutcome> {
        let existing = self
            .postings
            .find_by_sale_and_payment(payment.sale_id.clone(), payment.payment_ref.clone())
            .await?;

        let claimed = match existing {
            Some(posting) if posting.posted => return Ok(self.already_posted(posting)),
            Some(posting) => self.claim(posting, false).await?,
            None => self.reserve_row(payment).await?,
        };

        match claimed {
            Claim::Held(posting) => self.post_claimed(posting).await,
            Claim::Refused(current) if current.posted => Ok(self.already_posted(current)),
            Claim::Refused(current) => Ok(self.in_flight(current)),
        }
    }

    /// Claims and posts an existing row. `force` allows re-posting a posted row.
    pub async fn post_row(
        &self,
        posting: PaymentPostingEntity,
        force: bool,
    ) -> SyncResult<PostingOutcome> {
        if posting.posted && !force {
            return Ok(self.already_posted(posting));
        }

        match self.claim(posting, force).await? {
            Claim::Held(posting) => self.post_claimed(posting).await,
            Claim::Refused(current) if current.posted && !force => {
                Ok(self.already_posted(current))
            }
            Claim::Refused(current) => Ok(self.in_flight(current)),
        }
    }

    async fn claim(
        &self,
        posting: PaymentPostingEntity,
        include_posted: bool,
    ) -> SyncResult<Claim> {
        let now = Utc::now();
        let claimed = self
            .postings
            .claim(posting.id, now, now - self.claim_lease, include_posted)
            .await?;

        match claimed {
            Some(claimed) => Ok(Claim::Held(claimed)),
            None => {
                let current = self.postings.find_by_id(posting.id).await?.unwrap_or(posting);
                Ok(Claim::Refused(current))
            }
        }
    }

    /// Nothing but the claim release is written when the outbound call fails.
    async fn post_claimed(&self, posting: PaymentPostingEntity) -> SyncResult<PostingOutcome> {
        let request = PostSalePaymentRequest::from_minor_units(
            posting.sale_id.clone(),
            posting.amount_minor,
            posting.currency.clone(),
            posting.payment_intent_id.clone(),
            Utc::now(),
        );

        let response = match self.sales.post_payment(request).await {
            Ok(response) => {
                self.metrics.outbound(Upstream::Sales, "post_payment", true);
                response
            }
            Err(err) => {
                self.metrics.outbound(Upstream::Sales, "post_payment", false);
                self.metrics.incr(Counter::PaymentsFailed);
                error!(
                    sale_id = %posting.sale_id,
                    payment_ref = %posting.payment_intent_id,
                    posting_id = %posting.id,
                    error = ?err,
                    "payment_posting: sales platform rejected payment"
                );
                if let Err(release_err) = self.postings.release_claim(posting.id).await {
                    warn!(
                        posting_id = %posting.id,
                        error = ?release_err,
                        "payment_posting: failed to release claim, it lapses with the lease"
                    );
                }
                return Err(SyncError::Upstream(err));
            }
        };

        let posting = self
            .postings
            .mark_posted(posting.id, response, Utc::now())
            .await?;
        self.metrics.incr(Counter::PaymentsPosted);
        info!(
            sale_id = %posting.sale_id,
            payment_ref = %posting.payment_intent_id,
            posting_id = %posting.id,
            "payment_posting: payment posted"
        );

        let link_marked_paid = self.mark_link_paid(&posting.sale_id).await;

        Ok(PostingOutcome::Posted {
            posting,
            link_marked_paid,
        })
    }

    /// Inserts the row already claimed. Losing the insert refuses with the winner's row.
    async fn reserve_row(&self, payment: &ActionablePayment) -> SyncResult<Claim> {
        let now = Utc::now();
        let inserted = self
            .postings
            .insert(InsertPaymentPostingEntity {
                sale_id: payment.sale_id.clone(),
                payment_intent_id: payment.payment_ref.clone(),
                amount_minor: payment.amount_minor,
                currency: payment.currency.clone(),
                posted: false,
                claimed_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .await?;

        if let Some(posting) = inserted {
            return Ok(Claim::Held(posting));
        }

        let winner = self
            .postings
            .find_by_sale_and_payment(payment.sale_id.clone(), payment.payment_ref.clone())
            .await?
            .ok_or_else(|| {
                SyncError::Internal(anyhow::anyhow!(
                    "posting for sale {} payment {} vanished after conflict",
                    payment.sale_id,
                    payment.payment_ref
                ))
            })?;
        Ok(Claim::Refused(winner))
    }

    fn already_posted(&self, posting: PaymentPostingEntity) -> PostingOutcome {
        info!(
            sale_id = %posting.sale_id,
            payment_ref = %posting.payment_intent_id,
            "payment_posting: already posted, skipping"
        );
        PostingOutcome::AlreadyPosted(posting)
    }

    fn in_flight(&self, posting: PaymentPostingEntity) -> PostingOutcome {
        info!(
            sale_id = %posting.sale_id,
            payment_ref = %posting.payment_intent_id,
            posting_id = %posting.id,
            "payment_posting: another trigger holds this payment, skipping"
        );
        PostingOutcome::InFlight(posting)
    }

    /// The payment is already recorded upstream at this point, so a failure here is
    /// logged and left for a later trigger rather than surfaced.
    async fn mark_link_paid(&self, sale_id: &str) -> bool {
        match self
            .links
            .update_status(sale_id.to_string(), LinkStatus::Paid, None)
            .await
        {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(err) => {
                warn!(
                    sale_id = %sale_id,
                    error = ?err,
                    "payment_posting: failed to mark payment link paid"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::repositories::{
        payment_postings::MockPaymentPostingRepository,
        sale_payment_links::MockSalePaymentLinkRepository, sales_platform::MockSalesPlatform,
    };
    use serde_json::json;
    use uuid::Uuid;

    fn payment() -> ActionablePayment {
        ActionablePayment {
            sale_id: "12345".to_string(),
            sale_reference: None,
            payment_ref: "ch_1".to_string(),
            amount_minor: 15000,
            currency: "USD".to_string(),
        }
    }

    fn posting(posted: bool) -> PaymentPostingEntity {
        let now = Utc::now();
        PaymentPostingEntity {
            id: Uuid::new_v4(),
            sale_id: "12345".to_string(),
            payment_intent_id: "ch_1".to_string(),
            amount_minor: 15000,
            currency: "USD".to_string(),
            posted,
            response_payload: None,
            posted_at: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn poster(postings: MockPaymentPostingRepository, sales: MockSalesPlatform) -> PaymentPoster {
        PaymentPoster::new(
            Arc::new(postings),
            Arc::new(MockSalePaymentLinkRepository::new()),
            Arc::new(sales),
            Arc::new(SyncMetrics::default()),
        )
    }

    #[tokio::test]
    async fn posted_row_short_circuits_without_outbound_call() {
        let mut postings = MockPaymentPostingRepository::new();
        let row = posting(true);
        postings
            .expect_find_by_sale_and_payment()
            .returning(move |_, _| Ok(Some(row.clone())));
        postings.expect_insert().never();
        postings.expect_claim().never();

        let mut sales = MockSalesPlatform::new();
        sales.expect_post_payment().never();

        let outcome = poster(postings, sales).post(&payment()).await.unwrap();
        assert!(matches!(outcome, PostingOutcome::AlreadyPosted(_)));
    }

    #[tokio::test]
    async fn lost_insert_stops_without_outbound_call() {
        let mut postings = MockPaymentPostingRepository::new();
        let mut lookups = 0;
        let mut winner = posting(false);
        winner.claimed_at = Some(Utc::now());
        postings
            .expect_find_by_sale_and_payment()
            .times(2)
            .returning(move |_, _| {
                lookups += 1;
                Ok((lookups > 1).then(|| winner.clone()))
            });
        postings.expect_insert().times(1).returning(|_| Ok(None));
        postings.expect_claim().never();

        let mut sales = MockSalesPlatform::new();
        sales.expect_post_payment().never();

        let outcome = poster(postings, sales).post(&payment()).await.unwrap();
        assert!(matches!(outcome, PostingOutcome::InFlight(_)));
    }

    #[tokio::test]
    async fn held_claim_on_unposted_row_stops_without_outbound_call() {
        let mut postings = MockPaymentPostingRepository::new();
        let row = posting(false);
        let lookup = row.clone();
        postings
            .expect_find_by_sale_and_payment()
            .returning(move |_, _| Ok(Some(lookup.clone())));
        postings
            .expect_claim()
            .withf(|_, claimed_at, stale_before, include_posted| {
                !include_posted && *stale_before < *claimed_at
            })
            .times(1)
            .returning(|_, _, _, _| Ok(None));
        postings
            .expect_find_by_id()
            .returning(move |_| Ok(Some(row.clone())));

        let mut sales = MockSalesPlatform::new();
        sales.expect_post_payment().never();

        let outcome = poster(postings, sales).post(&payment()).await.unwrap();
        assert!(matches!(outcome, PostingOutcome::InFlight(_)));
    }

    #[tokio::test]
    async fn claimed_row_failure_releases_the_claim_and_leaves_it_unposted() {
        let mut postings = MockPaymentPostingRepository::new();
        let row = posting(false);
        let lookup = row.clone();
        postings
            .expect_find_by_sale_and_payment()
            .returning(move |_, _| Ok(Some(lookup.clone())));
        postings.expect_insert().never();
        postings
            .expect_claim()
            .times(1)
            .returning(move |_, at, _, _| {
                let mut claimed = row.clone();
                claimed.claimed_at = Some(at);
                Ok(Some(claimed))
            });
        postings.expect_release_claim().times(1).returning(|_| Ok(()));
        postings.expect_mark_posted().never();

        let mut sales = MockSalesPlatform::new();
        sales
            .expect_post_payment()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("sales platform unavailable")));

        let metrics = Arc::new(SyncMetrics::default());
        let poster = PaymentPoster::new(
            Arc::new(postings),
            Arc::new(MockSalePaymentLinkRepository::new()),
            Arc::new(sales),
            Arc::clone(&metrics),
        );

        let err = poster.post(&payment()).await.unwrap_err();
        assert!(matches!(err, SyncError::Upstream(_)));
        assert_eq!(metrics.get(Counter::PaymentsFailed), 1);
    }

    #[tokio::test]
    async fn new_payment_is_inserted_claimed_posted_and_link_marked_paid() {
        let mut postings = MockPaymentPostingRepository::new();
        postings
            .expect_find_by_sale_and_payment()
            .returning(|_, _| Ok(None));
        postings
            .expect_insert()
            .withf(|entity| {
                !entity.posted && entity.amount_minor == 15000 && entity.claimed_at.is_some()
            })
            .returning(|_| Ok(Some(posting(false))));
        postings.expect_claim().never();
        postings
            .expect_mark_posted()
            .returning(|_, payload, at| {
                let mut row = posting(true);
                row.response_payload = Some(payload);
                row.posted_at = Some(at);
                Ok(row)
            });

        let mut sales = MockSalesPlatform::new();
        sales
            .expect_post_payment()
            .withf(|request| request.reference == "ch_1" && request.sale_id == "12345")
            .times(1)
            .returning(|_| Ok(json!({ "ID": "pay_1" })));

        let mut links = MockSalePaymentLinkRepository::new();
        links
            .expect_update_status()
            .withf(|sale_id, status, _| sale_id == "12345" && *status == LinkStatus::Paid)
            .returning(|_, _, _| Ok(None));

        let poster = PaymentPoster::new(
            Arc::new(postings),
            Arc::new(links),
            Arc::new(sales),
            Arc::new(SyncMetrics::default()),
        );

        match poster.post(&payment()).await.unwrap() {
            PostingOutcome::Posted { posting, .. } => {
                assert!(posting.posted);
                assert_eq!(posting.response_payload, Some(json!({ "ID": "pay_1" })));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_row_on_posted_row_without_force_does_not_claim() {
        let mut postings = MockPaymentPostingRepository::new();
        postings.expect_claim().never();
        let mut sales = MockSalesPlatform::new();
        sales.expect_post_payment().never();

        let outcome = poster(postings, sales)
            .post_row(posting(true), false)
            .await
            .unwrap();
        assert!(matches!(outcome, PostingOutcome::AlreadyPosted(_)));
    }
}

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use crates::{
    domain::{
        entities::{
            idempotency_keys::IdempotencyKeyEntity,
            payment_postings::{InsertPaymentPostingEntity, PaymentPostingEntity},
            sale_payment_links::{InsertSalePaymentLinkEntity, SalePaymentLinkEntity},
            webhook_events::{InsertWebhookEventEntity, WebhookEventEntity},
        },
        repositories::{
            idempotency_keys::IdempotencyKeyRepository,
            payment_platform::PaymentPlatform,
            payment_postings::{PaymentPostingRepository, PostingCounts},
            sale_payment_links::SalePaymentLinkRepository,
            sales_platform::SalesPlatform,
            webhook_events::WebhookEventRepository,
        },
        value_objects::{
            enums::link_statuses::LinkStatus,
            idempotency::ReserveOutcome,
            payment_links::{CreatePaymentLinkRequest, CreatedPaymentLink},
            payment_webhook::PaymentWebhookEvent,
            sale_payments::PostSalePaymentRequest,
            sales::SaleRecord,
        },
    },
    payments::stripe_client::StripeClient,
};
use hmac::{Hmac, Mac};
use paylink_worker::{
    axum_http::http_serve::{self, HttpDependencies},
    metrics::SyncMetrics,
    usecases::{
        admin::AdminUseCase,
        idempotency_guard::IdempotencyGuard,
        payment_posting::PaymentPoster,
        payment_webhook::PaymentWebhookUseCase,
        sale_discovery::{DiscoverySettings, SaleDiscoveryUseCase},
    },
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_TOKEN: &str = "admin-test-token";

/// Single in-memory database backing all four repositories. Unique keys behave like the
/// Postgres constraints: a conflicting insert is a no-op.
#[derive(Default)]
pub struct MemoryStore {
    pub links: Mutex<HashMap<String, SalePaymentLinkEntity>>,
    pub events: Mutex<HashMap<String, WebhookEventEntity>>,
    pub postings: Mutex<Vec<PaymentPostingEntity>>,
    pub keys: Mutex<HashMap<String, IdempotencyKeyEntity>>,
}

impl MemoryStore {
    pub fn link(&self, sale_id: &str) -> Option<SalePaymentLinkEntity> {
        self.links.lock().unwrap().get(sale_id).cloned()
    }

    pub fn event(&self, event_id: &str) -> Option<WebhookEventEntity> {
        self.events.lock().unwrap().get(event_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn postings(&self) -> Vec<PaymentPostingEntity> {
        self.postings.lock().unwrap().clone()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn key(&self, key: &str) -> Option<IdempotencyKeyEntity> {
        self.keys.lock().unwrap().get(key).cloned()
    }

    pub fn seed_key(&self, key: &str, expires_at: DateTime<Utc>) {
        self.keys.lock().unwrap().insert(
            key.to_string(),
            IdempotencyKeyEntity {
                key: key.to_string(),
                operation: "create-link".to_string(),
                response_payload: None,
                created_at: expires_at - Duration::seconds(900),
                expires_at,
            },
        );
    }

    pub fn seed_link(&self, sale_id: &str, status: LinkStatus) -> SalePaymentLinkEntity {
        let now = Utc::now();
        let link = SalePaymentLinkEntity {
            id: Uuid::new_v4(),
            sale_id: sale_id.to_string(),
            sale_reference: None,
            payment_link_id: format!("plink_{sale_id}"),
            payment_link_url: format!("https://pay.test/plink_{sale_id}"),
            amount_minor: 15000,
            currency: "USD".to_string(),
            status: status.to_string(),
            status_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.links
            .lock()
            .unwrap()
            .insert(sale_id.to_string(), link.clone());
        link
    }
}

#[async_trait]
impl SalePaymentLinkRepository for MemoryStore {
    async fn find_by_sale_id(&self, sale_id: String) -> Result<Option<SalePaymentLinkEntity>> {
        Ok(self.links.lock().unwrap().get(&sale_id).cloned())
    }

    async fn insert(
        &self,
        entity: InsertSalePaymentLinkEntity,
    ) -> Result<Option<SalePaymentLinkEntity>> {
        let mut links = self.links.lock().unwrap();
        if links.contains_key(&entity.sale_id) {
            return Ok(None);
        }
        let row = SalePaymentLinkEntity {
            id: Uuid::new_v4(),
            sale_id: entity.sale_id.clone(),
            sale_reference: entity.sale_reference,
            payment_link_id: entity.payment_link_id,
            payment_link_url: entity.payment_link_url,
            amount_minor: entity.amount_minor,
            currency: entity.currency,
            status: entity.status,
            status_reason: None,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        };
        links.insert(entity.sale_id, row.clone());
        Ok(Some(row))
    }

    async fn update_status(
        &self,
        sale_id: String,
        status: LinkStatus,
        reason: Option<String>,
    ) -> Result<Option<SalePaymentLinkEntity>> {
        let mut links = self.links.lock().unwrap();
        Ok(links.get_mut(&sale_id).map(|link| {
            link.status = status.to_string();
            link.status_reason = reason;
            link.updated_at = Utc::now();
            link.clone()
        }))
    }
}

#[async_trait]
impl WebhookEventRepository for MemoryStore {
    async fn find_by_event_id(&self, event_id: String) -> Result<Option<WebhookEventEntity>> {
        Ok(self.events.lock().unwrap().get(&event_id).cloned())
    }

    async fn insert(&self, entity: InsertWebhookEventEntity) -> Result<bool> {
        let mut events = self.events.lock().unwrap();
        if events.contains_key(&entity.event_id) {
            return Ok(false);
        }
        events.insert(
            entity.event_id.clone(),
            WebhookEventEntity {
                event_id: entity.event_id,
                event_type: entity.event_type,
                payment_intent_id: entity.payment_intent_id,
                charge_id: entity.charge_id,
                sale_id: entity.sale_id,
                sale_reference: entity.sale_reference,
                amount_minor: entity.amount_minor,
                currency: entity.currency,
                processed: entity.processed,
                processed_at: None,
                payload: entity.payload,
                received_at: entity.received_at,
            },
        );
        Ok(true)
    }

    async fn mark_processed(&self, event_id: String, processed_at: DateTime<Utc>) -> Result<()> {
        if let Some(event) = self.events.lock().unwrap().get_mut(&event_id) {
            event.processed = true;
            event.processed_at = Some(processed_at);
        }
        Ok(())
    }

    async fn reset_processed(&self, event_id: String) -> Result<()> {
        if let Some(event) = self.events.lock().unwrap().get_mut(&event_id) {
            event.processed = false;
            event.processed_at = None;
        }
        Ok(())
    }

    async fn mark_processed_for_payment(
        &self,
        sale_id: String,
        payment_ref: String,
        processed_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut closed = 0;
        for event in self.events.lock().unwrap().values_mut() {
            let matches_ref = event.payment_intent_id.as_deref() == Some(payment_ref.as_str())
                || event.charge_id.as_deref() == Some(payment_ref.as_str());
            if !event.processed && event.sale_id.as_deref() == Some(sale_id.as_str()) && matches_ref
            {
                event.processed = true;
                event.processed_at = Some(processed_at);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn count_by_types_between(
        &self,
        event_types: Vec<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| event_types.contains(&e.event_type))
            .filter(|e| e.received_at >= from && e.received_at < to)
            .count() as i64)
    }
}

#[async_trait]
impl PaymentPostingRepository for MemoryStore {
    async fn find_by_id(&self, posting_id: Uuid) -> Result<Option<PaymentPostingEntity>> {
        Ok(self
            .postings
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == posting_id)
            .cloned())
    }

    async fn find_by_sale_and_payment(
        &self,
        sale_id: String,
        payment_ref: String,
    ) -> Result<Option<PaymentPostingEntity>> {
        Ok(self
            .postings
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.sale_id == sale_id && p.payment_intent_id == payment_ref)
            .cloned())
    }

    async fn insert(
        &self,
        entity: InsertPaymentPostingEntity,
    ) -> Result<Option<PaymentPostingEntity>> {
        let mut postings = self.postings.lock().unwrap();
        if postings
            .iter()
            .any(|p| p.sale_id == entity.sale_id && p.payment_intent_id == entity.payment_intent_id)
        {
            return Ok(None);
        }
        let row = PaymentPostingEntity {
            id: Uuid::new_v4(),
            sale_id: entity.sale_id,
            payment_intent_id: entity.payment_intent_id,
            amount_minor: entity.amount_minor,
            currency: entity.currency,
            posted: entity.posted,
            response_payload: None,
            posted_at: None,
            claimed_at: entity.claimed_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        };
        postings.push(row.clone());
        Ok(Some(row))
    }

    async fn claim(
        &self,
        posting_id: Uuid,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        include_posted: bool,
    ) -> Result<Option<PaymentPostingEntity>> {
        let mut postings = self.postings.lock().unwrap();
        let Some(row) = postings.iter_mut().find(|p| p.id == posting_id) else {
            return Ok(None);
        };
        let claimable = row.claimed_at.is_none_or(|at| at < stale_before);
        if !claimable || (row.posted && !include_posted) {
            return Ok(None);
        }
        row.claimed_at = Some(claimed_at);
        row.updated_at = claimed_at;
        Ok(Some(row.clone()))
    }

    async fn release_claim(&self, posting_id: Uuid) -> Result<()> {
        if let Some(row) = self
            .postings
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == posting_id)
        {
            row.claimed_at = None;
        }
        Ok(())
    }

    async fn mark_posted(
        &self,
        posting_id: Uuid,
        response_payload: Value,
        posted_at: DateTime<Utc>,
    ) -> Result<PaymentPostingEntity> {
        let mut postings = self.postings.lock().unwrap();
        let row = postings
            .iter_mut()
            .find(|p| p.id == posting_id)
            .ok_or_else(|| anyhow!("posting {posting_id} not found"))?;
        row.posted = true;
        row.response_payload = Some(response_payload);
        row.posted_at = Some(posted_at);
        row.claimed_at = None;
        row.updated_at = posted_at;
        Ok(row.clone())
    }

    async fn list_unposted(&self, limit: i64, offset: i64) -> Result<Vec<PaymentPostingEntity>> {
        let mut rows: Vec<_> = self
            .postings
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.posted)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<PostingCounts> {
        let postings = self.postings.lock().unwrap();
        let in_window = postings
            .iter()
            .filter(|p| p.created_at >= from && p.created_at < to);
        let mut counts = PostingCounts::default();
        for posting in in_window {
            if posting.posted {
                counts.posted += 1;
            } else {
                counts.unposted += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl IdempotencyKeyRepository for MemoryStore {
    async fn reserve(&self, entity: IdempotencyKeyEntity) -> Result<ReserveOutcome> {
        let mut keys = self.keys.lock().unwrap();
        match keys.get(&entity.key) {
            Some(existing) if existing.is_live_at(entity.created_at) => {
                Ok(ReserveOutcome::AlreadyHeld)
            }
            _ => {
                keys.insert(entity.key.clone(), entity);
                Ok(ReserveOutcome::Reserved)
            }
        }
    }

    async fn find_live(
        &self,
        key: String,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyKeyEntity>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&key)
            .filter(|k| k.is_live_at(now))
            .cloned())
    }

    async fn attach_result(&self, key: String, response_payload: Value) -> Result<()> {
        if let Some(row) = self.keys.lock().unwrap().get_mut(&key) {
            row.response_payload = Some(response_payload);
        }
        Ok(())
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .values()
            .filter(|k| !k.is_live_at(now))
            .count() as i64)
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IdempotencyKeyEntity>> {
        let mut rows: Vec<_> = self
            .keys
            .lock()
            .unwrap()
            .values()
            .filter(|k| !k.is_live_at(now))
            .cloned()
            .collect();
        rows.sort_by_key(|k| k.expires_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut keys = self.keys.lock().unwrap();
        let before = keys.len();
        keys.retain(|_, k| k.is_live_at(now));
        Ok(before - keys.len())
    }
}

/// Sales platform double that records every write.
pub struct FakeSales {
    pub credentials: bool,
    pub sales: Mutex<Vec<SaleRecord>>,
    pub notes: Mutex<Vec<(String, String)>>,
    pub payments: Mutex<Vec<PostSalePaymentRequest>>,
    pub fail_posts: AtomicBool,
    pub post_delay_ms: AtomicU64,
    pub post_calls: AtomicUsize,
    pub panic_on_list: AtomicBool,
}

impl FakeSales {
    pub fn new(credentials: bool) -> Self {
        Self {
            credentials,
            sales: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
            fail_posts: AtomicBool::new(false),
            post_delay_ms: AtomicU64::new(0),
            post_calls: AtomicUsize::new(0),
            panic_on_list: AtomicBool::new(false),
        }
    }

    pub fn add_sale(&self, sale: SaleRecord) {
        self.sales.lock().unwrap().push(sale);
    }

    pub fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    /// Makes every payment post take this long, widening race windows.
    pub fn set_post_delay(&self, delay: std::time::Duration) {
        self.post_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_panic_on_list(&self, panic: bool) {
        self.panic_on_list.store(panic, Ordering::SeqCst);
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn payments(&self) -> Vec<PostSalePaymentRequest> {
        self.payments.lock().unwrap().clone()
    }

    pub fn notes(&self) -> Vec<(String, String)> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SalesPlatform for FakeSales {
    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn list_sales(
        &self,
        _modified_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SaleRecord>> {
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("sales listing blew up");
        }
        let sales = self.sales.lock().unwrap();
        Ok(sales.iter().take(limit).cloned().collect())
    }

    async fn get_sale(&self, sale_id: String) -> Result<Option<SaleRecord>> {
        Ok(self
            .sales
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.sale_id == sale_id)
            .cloned())
    }

    async fn update_sale_note(&self, sale_id: String, note: String) -> Result<()> {
        self.notes.lock().unwrap().push((sale_id, note));
        Ok(())
    }

    async fn post_payment(&self, request: PostSalePaymentRequest) -> Result<Value> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.post_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(anyhow!("sales platform returned 503"));
        }
        let mut payments = self.payments.lock().unwrap();
        payments.push(request.clone());
        Ok(json!({ "ID": format!("pay_{}", payments.len()), "SaleID": request.sale_id }))
    }
}

/// Payment platform double: link creation is faked, signature verification is the real
/// client's.
pub struct FakePaymentPlatform {
    verifier: StripeClient,
    pub created: Mutex<Vec<CreatePaymentLinkRequest>>,
    counter: AtomicUsize,
}

impl FakePaymentPlatform {
    pub fn new() -> Self {
        Self {
            verifier: StripeClient::new(
                "http://127.0.0.1:9".to_string(),
                "sk_test_xxx".to_string(),
                WEBHOOK_SECRET.to_string(),
                300,
            )
            .expect("stripe client"),
            created: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> Vec<CreatePaymentLinkRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentPlatform for FakePaymentPlatform {
    async fn create_payment_link(
        &self,
        request: CreatePaymentLinkRequest,
    ) -> Result<CreatedPaymentLink> {
        tokio::task::yield_now().await;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().unwrap().push(request);
        Ok(CreatedPaymentLink {
            id: format!("plink_{n}"),
            url: format!("https://pay.test/plink_{n}"),
            active: true,
        })
    }

    async fn retrieve_payment_link(&self, payment_link_id: String) -> Result<CreatedPaymentLink> {
        Ok(CreatedPaymentLink {
            url: format!("https://pay.test/{payment_link_id}"),
            id: payment_link_id,
            active: true,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> Result<PaymentWebhookEvent> {
        self.verifier.verify_webhook(payload, signature_header)
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub sales: Arc<FakeSales>,
    pub platform: Arc<FakePaymentPlatform>,
    pub metrics: Arc<SyncMetrics>,
    pub guard: Arc<IdempotencyGuard>,
    pub poster: Arc<PaymentPoster>,
    pub webhooks: Arc<PaymentWebhookUseCase>,
    pub admin: Arc<AdminUseCase>,
    pub discovery: Arc<SaleDiscoveryUseCase>,
    admin_token: Option<String>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_admin_token(Some(ADMIN_TOKEN))
    }

    pub fn with_admin_token(admin_token: Option<&str>) -> Self {
        Self::build(admin_token, true)
    }

    pub fn without_sales_credentials() -> Self {
        Self::build(Some(ADMIN_TOKEN), false)
    }

    fn build(admin_token: Option<&str>, sales_credentials: bool) -> Self {
        let store = Arc::new(MemoryStore::default());
        let sales = Arc::new(FakeSales::new(sales_credentials));
        let platform = Arc::new(FakePaymentPlatform::new());
        let metrics = Arc::new(SyncMetrics::default());

        let links: Arc<dyn SalePaymentLinkRepository + Send + Sync> = store.clone();
        let events: Arc<dyn WebhookEventRepository + Send + Sync> = store.clone();
        let postings: Arc<dyn PaymentPostingRepository + Send + Sync> = store.clone();
        let keys: Arc<dyn IdempotencyKeyRepository + Send + Sync> = store.clone();
        let sales_dyn: Arc<dyn SalesPlatform + Send + Sync> = sales.clone();
        let platform_dyn: Arc<dyn PaymentPlatform + Send + Sync> = platform.clone();

        let guard = Arc::new(IdempotencyGuard::new(keys, Duration::seconds(900)));
        let poster = Arc::new(PaymentPoster::new(
            Arc::clone(&postings),
            Arc::clone(&links),
            Arc::clone(&sales_dyn),
            Arc::clone(&metrics),
        ));
        let webhooks = Arc::new(PaymentWebhookUseCase::new(
            Arc::clone(&platform_dyn),
            Arc::clone(&events),
            Arc::clone(&poster),
            Arc::clone(&metrics),
            "USD".to_string(),
        ));
        let admin = Arc::new(AdminUseCase::new(
            events,
            postings,
            Arc::clone(&links),
            Arc::clone(&guard),
            Arc::clone(&poster),
            Arc::clone(&webhooks),
        ));
        let discovery = Arc::new(SaleDiscoveryUseCase::new(
            sales_dyn,
            platform_dyn,
            links,
            Arc::clone(&guard),
            Arc::clone(&metrics),
            DiscoverySettings {
                lookback_days: 7,
                batch_size: 100,
                eligible_statuses: vec!["AUTHORISED".to_string(), "INVOICED".to_string()],
                default_currency: "USD".to_string(),
                link_note_prefix: "Payment link:".to_string(),
            },
        ));

        Self {
            store,
            sales,
            platform,
            metrics,
            guard,
            poster,
            webhooks,
            admin,
            discovery,
            admin_token: admin_token.map(str::to_string),
        }
    }

    pub fn router(&self) -> Router {
        http_serve::build_router(HttpDependencies {
            webhook_usecase: Arc::clone(&self.webhooks),
            admin_usecase: Arc::clone(&self.admin),
            metrics: Arc::clone(&self.metrics),
            admin_token: self.admin_token.clone(),
        })
    }
}

pub fn sale(sale_id: &str, status: &str, total: &str) -> SaleRecord {
    SaleRecord {
        sale_id: sale_id.to_string(),
        reference: Some(format!("SO-{sale_id}")),
        status: status.to_string(),
        total: Some(total.parse::<Decimal>().expect("decimal literal")),
        currency: Some("USD".to_string()),
        customer: Some("Acme Ltd".to_string()),
        updated_at: Some(Utc::now()),
    }
}

pub fn charge_succeeded(event_id: &str, sale_id: &str, charge_id: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": "charge.succeeded",
        "created": Utc::now().timestamp(),
        "data": { "object": {
            "object": "charge",
            "id": charge_id,
            "amount": amount,
            "currency": "usd",
            "metadata": { "sale_id": sale_id }
        }}
    }))
    .expect("serialize event")
}

pub fn signature_for(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn sign(payload: &[u8]) -> String {
    signature_for(payload, WEBHOOK_SECRET, Utc::now().timestamp())
}

/// Polls until `check` holds; background processing runs on spawned tasks.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}

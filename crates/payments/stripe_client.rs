use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info};

use crate::domain::{
    repositories::payment_platform::PaymentPlatform,
    value_objects::{
        payment_links::{
            CreatePaymentLinkRequest, CreatedPaymentLink, METADATA_SALE_ID,
            METADATA_SALE_REFERENCE,
        },
        payment_webhook::PaymentWebhookEvent,
    },
};

type HmacSha256 = Hmac<Sha256>;

/// Payment-link and webhook client for the Stripe API, built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    tolerance_secs: i64,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripePaymentLink {
    id: String,
    url: String,
    #[serde(default)]
    active: bool,
}

impl From<StripePaymentLink> for CreatedPaymentLink {
    fn from(link: StripePaymentLink) -> Self {
        Self {
            id: link.id,
            url: link.url,
            active: link.active,
        }
    }
}

impl StripeClient {
    pub fn new(
        api_base: String,
        secret_key: String,
        webhook_secret: String,
        tolerance_secs: i64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build stripe http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            webhook_secret,
            tolerance_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.clone()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.clone()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.clone()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.clone()),
            context = %context,
            "stripe: api request failed"
        );

        bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn create_price(&self, request: &CreatePaymentLinkRequest) -> Result<String> {
        let body = [
            ("currency", request.currency.to_ascii_lowercase()),
            ("unit_amount", request.amount_minor.to_string()),
            ("product_data[name]", request.description.clone()),
        ];

        let resp = self
            .http
            .post(self.url("prices"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(
                "Idempotency-Key",
                format!("price-{}-{}", request.sale_id, request.amount_minor),
            )
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create price").await?;

        let price: StripePrice = resp.json().await?;
        Ok(price.id)
    }

    /// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=..]`) against the raw body
    /// at the given clock reading.
    pub fn verify_signature_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_unix: i64,
    ) -> Result<()> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();

        for part in signature_header.split(',') {
            let part = part.trim();
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = rest.parse::<i64>().ok();
            } else if let Some(rest) = part.strip_prefix("v1=") {
                if let Ok(bytes) = hex::decode(rest) {
                    signatures.push(bytes);
                }
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow!("missing timestamp in stripe-signature"))?;
        if signatures.is_empty() {
            bail!("missing v1 in stripe-signature");
        }
        if now_unix.abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            bail!("stripe-signature timestamp outside tolerance");
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
        if !matched {
            bail!("invalid webhook signature");
        }

        Ok(())
    }
}

#[async_trait]
impl PaymentPlatform for StripeClient {
    async fn create_payment_link(
        &self,
        request: CreatePaymentLinkRequest,
    ) -> Result<CreatedPaymentLink> {
        let price_id = self.create_price(&request).await?;
        let reference = request.sale_reference.clone().unwrap_or_default();

        let body: Vec<(String, String)> = vec![
            ("line_items[0][price]".to_string(), price_id),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (format!("metadata[{METADATA_SALE_ID}]"), request.sale_id.clone()),
            (format!("metadata[{METADATA_SALE_REFERENCE}]"), reference.clone()),
            (
                format!("payment_intent_data[metadata][{METADATA_SALE_ID}]"),
                request.sale_id.clone(),
            ),
            (
                format!("payment_intent_data[metadata][{METADATA_SALE_REFERENCE}]"),
                reference,
            ),
        ];

        let resp = self
            .http
            .post(self.url("payment_links"))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(
                "Idempotency-Key",
                format!("payment-link-{}-{}", request.sale_id, request.amount_minor),
            )
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create payment link").await?;

        let link: StripePaymentLink = resp.json().await?;
        info!(
            sale_id = %request.sale_id,
            payment_link_id = %link.id,
            "stripe: payment link created"
        );

        Ok(link.into())
    }

    async fn retrieve_payment_link(&self, payment_link_id: String) -> Result<CreatedPaymentLink> {
        let resp = self
            .http
            .get(self.url(&format!("payment_links/{payment_link_id}")))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve payment link").await?;

        let link: StripePaymentLink = resp.json().await?;
        Ok(link.into())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<PaymentWebhookEvent> {
        self.verify_signature_at(payload, signature_header, Utc::now().timestamp())?;

        let event: PaymentWebhookEvent =
            serde_json::from_slice(payload).context("webhook payload is not a valid event")?;
        Ok(event)
    }
}

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::domain::{
    repositories::sales_platform::SalesPlatform,
    value_objects::{sale_payments::PostSalePaymentRequest, sales::SaleRecord},
};

const ACCOUNT_HEADER: &str = "api-auth-accountid";
const APPLICATION_KEY_HEADER: &str = "api-auth-applicationkey";
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct SalesCredentials {
    pub account_id: String,
    pub application_key: String,
}

/// REST client for the inventory/sales platform (Cin7 Core external API v2).
pub struct SalesClient {
    http: reqwest::Client,
    api_base: String,
    credentials: Option<SalesCredentials>,
    payment_account: String,
}

#[derive(Debug, Deserialize)]
struct SaleListResponse {
    #[serde(rename = "SaleList", default)]
    sale_list: Vec<Value>,
}

/// Body of `POST sale/payment`. The API expects `Amount` as a JSON number.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SalePaymentBody<'a> {
    #[serde(rename = "SaleID")]
    sale_id: &'a str,
    #[serde(rename = "Type")]
    kind: &'static str,
    reference: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    date_paid: String,
    account: &'a str,
    currency: &'a str,
}

impl<'a> SalePaymentBody<'a> {
    fn new(request: &'a PostSalePaymentRequest, account: &'a str) -> Self {
        Self {
            sale_id: &request.sale_id,
            kind: "Payment",
            reference: &request.reference,
            amount: request.amount,
            date_paid: request.date_paid.format("%Y-%m-%d").to_string(),
            account,
            currency: &request.currency,
        }
    }
}

impl SalesClient {
    pub fn new(
        api_base: String,
        credentials: Option<SalesCredentials>,
        payment_account: String,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build sales http client")?;

        let credentials = credentials
            .filter(|c| !c.account_id.trim().is_empty() && !c.application_key.trim().is_empty());

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            payment_account,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let Some(credentials) = &self.credentials else {
            bail!("sales platform credentials are not configured");
        };

        Ok(builder
            .header(ACCOUNT_HEADER, &credentials.account_id)
            .header(APPLICATION_KEY_HEADER, &credentials.application_key))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        error!(
            status = %status,
            response_body = %body,
            context = %context,
            "sales: api request failed"
        );

        bail!("sales API request failed: {} (status {})", context, status);
    }
}

#[async_trait]
impl SalesPlatform for SalesClient {
    fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    async fn list_sales(
        &self,
        modified_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SaleRecord>> {
        let page_size = limit.clamp(1, MAX_PAGE_SIZE);
        let request = self.authorized(self.http.get(self.url("saleList")))?.query(&[
            ("Page", "1".to_string()),
            ("Limit", page_size.to_string()),
            (
                "UpdatedSince",
                modified_since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]);

        let resp = Self::ensure_success(request.send().await?, "list sales").await?;
        let parsed: SaleListResponse = resp.json().await?;

        let mut sales = Vec::with_capacity(parsed.sale_list.len());
        for raw in parsed.sale_list.into_iter().take(limit) {
            match SaleRecord::from_value(raw) {
                Ok(sale) => sales.push(sale),
                Err(err) => warn!(error = %err, "sales: skipping malformed sale record"),
            }
        }

        Ok(sales)
    }

    async fn get_sale(&self, sale_id: String) -> Result<Option<SaleRecord>> {
        let request = self
            .authorized(self.http.get(self.url("sale")))?
            .query(&[("ID", sale_id.as_str())]);

        let resp = request.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::ensure_success(resp, "get sale").await?;
        let raw: Value = resp.json().await?;

        Ok(Some(SaleRecord::from_value(raw)?))
    }

    async fn update_sale_note(&self, sale_id: String, note: String) -> Result<()> {
        let request = self
            .authorized(self.http.put(self.url("sale")))?
            .json(&json!({ "ID": sale_id, "Note": note }));

        Self::ensure_success(request.send().await?, "update sale note").await?;
        Ok(())
    }

    async fn post_payment(&self, request: PostSalePaymentRequest) -> Result<Value> {
        let body = SalePaymentBody::new(&request, &self.payment_account);

        let builder = self
            .authorized(self.http.post(self.url("sale/payment")))?
            .json(&body);

        let resp = Self::ensure_success(builder.send().await?, "post sale payment").await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Total fields consulted in order; the first non-empty one wins.
pub const TOTAL_FIELD_CANDIDATES: [&str; 4] = ["Total", "InvoiceAmount", "OrderTotal", "TotalAmount"];

pub const DEFAULT_ELIGIBLE_STATUSES: [&str; 2] = ["AUTHORISED", "INVOICED"];

/// Sale record as returned by the sales platform. Every field is optional on the wire,
/// so nothing here is trusted until it has gone through [`SaleRecord::from_raw`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSale {
    #[serde(rename = "SaleID", alias = "ID")]
    pub sale_id: Option<String>,
    #[serde(rename = "OrderNumber")]
    pub order_number: Option<String>,
    #[serde(rename = "InvoiceNumber")]
    pub invoice_number: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "OrderStatus")]
    pub order_status: Option<String>,
    #[serde(rename = "CustomerCurrency", alias = "Currency")]
    pub currency: Option<String>,
    #[serde(rename = "Customer")]
    pub customer: Option<String>,
    #[serde(rename = "Updated")]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// Normalised sale: required fields present, status case-folded, total parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleRecord {
    pub sale_id: String,
    pub reference: Option<String>,
    pub status: String,
    pub total: Option<Decimal>,
    pub currency: Option<String>,
    pub customer: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SaleRecord {
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawSale = serde_json::from_value(value)
            .map_err(|err| anyhow!("sale record is malformed: {err}"))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawSale) -> Result<Self> {
        let sale_id = non_empty(raw.sale_id).ok_or_else(|| anyhow!("sale id is required"))?;

        let status = non_empty(raw.status)
            .or_else(|| non_empty(raw.order_status))
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_default();

        let total = TOTAL_FIELD_CANDIDATES
            .iter()
            .filter_map(|field| raw.rest.get(*field))
            .find_map(parse_amount);

        Ok(Self {
            sale_id,
            reference: non_empty(raw.order_number).or_else(|| non_empty(raw.invoice_number)),
            status,
            total,
            currency: non_empty(raw.currency).map(|c| c.to_ascii_uppercase()),
            customer: non_empty(raw.customer),
            updated_at: raw
                .updated
                .as_deref()
                .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
                .map(|v| v.with_timezone(&Utc)),
        })
    }

    pub fn is_eligible(&self, eligible_statuses: &[String]) -> bool {
        eligible_statuses
            .iter()
            .any(|status| status.eq_ignore_ascii_case(&self.status))
    }

    /// Payable amount in integer minor units, or `None` when the sale has no usable total
    /// or the total is not positive.
    pub fn payable_amount_minor(&self) -> Option<i64> {
        self.total.and_then(to_minor_units).filter(|amount| *amount > 0)
    }

    pub fn display_reference(&self) -> &str {
        self.reference.as_deref().unwrap_or(&self.sale_id)
    }
}

/// Major units to minor units: multiply by 100 and round half away from zero.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .ok(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Decimal::from_str(trimmed).ok()
            }
        }
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

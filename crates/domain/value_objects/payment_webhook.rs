use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payment_links::{METADATA_SALE_ID, METADATA_SALE_REFERENCE};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Signed event envelope pushed by the payment platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentWebhookData {
    pub object: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CheckoutSessionAsyncPaymentSucceeded,
    PaymentIntentSucceeded,
    ChargeSucceeded,
    Other,
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => EventKind::CheckoutSessionCompleted,
            "checkout.session.async_payment_succeeded" => {
                EventKind::CheckoutSessionAsyncPaymentSucceeded
            }
            "payment_intent.succeeded" => EventKind::PaymentIntentSucceeded,
            "charge.succeeded" => EventKind::ChargeSucceeded,
            _ => EventKind::Other,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, EventKind::Other)
    }
}

pub const SUCCESS_EVENT_TYPES: [&str; 4] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "payment_intent.succeeded",
    "charge.succeeded",
];

/// Correlation data pulled out of an event payload. Every field is optional because
/// events that did not originate from one of our payment links carry none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentLinkage {
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub sale_id: Option<String>,
    pub sale_reference: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
}

/// Everything needed to post a payment: a sale, a payment identifier and an amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionablePayment {
    pub sale_id: String,
    pub sale_reference: Option<String>,
    pub payment_ref: String,
    pub amount_minor: i64,
    pub currency: String,
}

impl PaymentLinkage {
    /// Payment-intent id when present, otherwise the charge id.
    pub fn payment_ref(&self) -> Option<&str> {
        self.payment_intent_id
            .as_deref()
            .or(self.charge_id.as_deref())
    }

    pub fn actionable(&self, default_currency: &str) -> Option<ActionablePayment> {
        let sale_id = self.sale_id.clone()?;
        let payment_ref = self.payment_ref()?.to_string();
        let amount_minor = self.amount_minor.filter(|amount| *amount > 0)?;

        Some(ActionablePayment {
            sale_id,
            sale_reference: self.sale_reference.clone(),
            payment_ref,
            amount_minor,
            currency: self
                .currency
                .clone()
                .unwrap_or_else(|| default_currency.to_ascii_uppercase()),
        })
    }
}

impl PaymentWebhookEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.type_)
    }

    pub fn extract_linkage(&self) -> PaymentLinkage {
        extract_linkage(&self.data.object)
    }
}

/// Reads the linkage fields from a checkout session, payment intent or charge object.
pub fn extract_linkage(object: &Value) -> PaymentLinkage {
    let object_type = string_field(object, "object").unwrap_or_default();
    let id = string_field(object, "id");

    let (payment_intent_id, charge_id) = match object_type.as_str() {
        "payment_intent" => (id, string_field(object, "latest_charge")),
        "charge" => (string_field(object, "payment_intent"), id),
        _ => (string_field(object, "payment_intent"), None),
    };

    let amount_minor = ["amount_total", "amount_received", "amount"]
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_i64));

    let metadata = object.get("metadata");
    let sale_id = metadata.and_then(|m| string_field(m, METADATA_SALE_ID));
    let sale_reference = metadata.and_then(|m| string_field(m, METADATA_SALE_REFERENCE));

    PaymentLinkage {
        payment_intent_id,
        charge_id,
        sale_id,
        sale_reference,
        amount_minor,
        currency: string_field(object, "currency").map(|c| c.to_ascii_uppercase()),
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        // expanded objects, e.g. `payment_intent: { id: .. }`
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        _ => None,
    }
}

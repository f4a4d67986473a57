use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outbound "payment received" notice posted against a sale.
/// `reference` carries the payment-intent (or charge) id so that a repeated post with the
/// same identifiers can be recognised by the sales platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSalePaymentRequest {
    pub sale_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub reference: String,
    pub date_paid: DateTime<Utc>,
}

impl PostSalePaymentRequest {
    pub fn from_minor_units(
        sale_id: String,
        amount_minor: i64,
        currency: String,
        reference: String,
        date_paid: DateTime<Utc>,
    ) -> Self {
        Self {
            sale_id,
            amount: Decimal::new(amount_minor, 2),
            currency,
            reference,
            date_paid,
        }
    }
}

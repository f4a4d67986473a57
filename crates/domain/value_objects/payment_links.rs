use serde::{Deserialize, Serialize};

/// Metadata keys attached to every payment link so that the completion webhook can be
/// correlated back to the originating sale.
pub const METADATA_SALE_ID: &str = "sale_id";
pub const METADATA_SALE_REFERENCE: &str = "sale_reference";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentLinkRequest {
    pub sale_id: String,
    pub sale_reference: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPaymentLink {
    pub id: String,
    pub url: String,
    pub active: bool,
}

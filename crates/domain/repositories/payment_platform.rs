use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::{
    payment_links::{CreatePaymentLinkRequest, CreatedPaymentLink},
    payment_webhook::PaymentWebhookEvent,
};

#[automock]
#[async_trait]
pub trait PaymentPlatform {
    async fn create_payment_link(
        &self,
        request: CreatePaymentLinkRequest,
    ) -> Result<CreatedPaymentLink>;
    async fn retrieve_payment_link(&self, payment_link_id: String) -> Result<CreatedPaymentLink>;
    /// Checks the signature header against the raw body and parses the envelope.
    fn verify_webhook(&self, payload: &[u8], signature_header: &str)
    -> Result<PaymentWebhookEvent>;
}

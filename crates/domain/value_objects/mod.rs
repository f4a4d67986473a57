pub mod admin;
pub mod enums;
pub mod idempotency;
pub mod payment_links;
pub mod payment_webhook;
pub mod sale_payments;
pub mod sales;

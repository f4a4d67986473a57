pub mod idempotency_keys;
pub mod payment_platform;
pub mod payment_postings;
pub mod sale_payment_links;
pub mod sales_platform;
pub mod webhook_events;

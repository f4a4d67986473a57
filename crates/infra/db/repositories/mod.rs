pub mod idempotency_keys;
pub mod payment_postings;
pub mod sale_payment_links;
pub mod webhook_events;

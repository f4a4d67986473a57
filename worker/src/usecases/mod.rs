pub mod admin;
pub mod idempotency_guard;
pub mod payment_posting;
pub mod payment_webhook;
pub mod sale_discovery;
pub mod sync_error;

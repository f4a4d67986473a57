pub mod admin;
pub mod payment_webhook;

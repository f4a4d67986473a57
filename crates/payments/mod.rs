pub mod sales_client;
pub mod stripe_client;

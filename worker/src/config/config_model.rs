#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker_server: WorkerServer,
    pub database: Database,
    pub stripe: Stripe,
    pub sales: Sales,
    pub admin: Admin,
    pub discovery: Discovery,
    pub idempotency: Idempotency,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct Sales {
    pub api_base: String,
    pub account_id: Option<String>,
    pub application_key: Option<String>,
    pub payment_account: String,
}

#[derive(Debug, Clone)]
pub struct Admin {
    /// Routes answer 503 while this is unset.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    pub enabled: bool,
    pub interval_secs: u64,
    pub lookback_days: i64,
    pub batch_size: usize,
    pub eligible_statuses: Vec<String>,
    pub default_currency: String,
    pub link_note_prefix: String,
}

#[derive(Debug, Clone)]
pub struct Idempotency {
    pub ttl_secs: i64,
}

use std::str::FromStr;

use super::config_model::{
    Admin, Database, Discovery, DotEnvyConfig, Idempotency, Sales, Stripe, WorkerServer,
};
use anyhow::{Context, Result};
use crates::domain::value_objects::sales::DEFAULT_ELIGIBLE_STATUSES;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let worker_server = WorkerServer {
        port: required("SERVER_PORT")?
            .parse()
            .context("SERVER_PORT is invalid")?,
        body_limit: parse_or("SERVER_BODY_LIMIT", 2)?,
        timeout: parse_or("SERVER_TIMEOUT", 30)?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        run_migrations: parse_or("RUN_MIGRATIONS", true)?,
    };

    let stripe = Stripe {
        api_base: optional("STRIPE_API_BASE")
            .unwrap_or_else(|| "https://api.stripe.com".to_string()),
        secret_key: required("STRIPE_SECRET_KEY")?,
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        webhook_tolerance_secs: parse_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
    };

    let sales = Sales {
        api_base: optional("SALES_API_BASE").unwrap_or_else(|| {
            "https://inventory.dearsystems.com/ExternalApi/v2".to_string()
        }),
        account_id: optional("SALES_ACCOUNT_ID"),
        application_key: optional("SALES_APPLICATION_KEY"),
        payment_account: optional("SALES_PAYMENT_ACCOUNT").unwrap_or_else(|| "1000".to_string()),
    };

    let admin = Admin {
        token: optional("ADMIN_TOKEN"),
    };

    let eligible_statuses = optional("WORKER_ELIGIBLE_STATUSES")
        .map(|raw| parse_status_list(&raw))
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| {
            DEFAULT_ELIGIBLE_STATUSES
                .iter()
                .map(|status| status.to_string())
                .collect()
        });

    let discovery = Discovery {
        enabled: parse_or("WORKER_ENABLED", true)?,
        interval_secs: parse_or::<u64>("WORKER_INTERVAL_SECS", 300)?.max(1),
        lookback_days: parse_or::<i64>("WORKER_LOOKBACK_DAYS", 7)?.max(0),
        batch_size: parse_or::<usize>("WORKER_BATCH_SIZE", 100)?.max(1),
        eligible_statuses,
        default_currency: optional("DEFAULT_CURRENCY")
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase(),
        link_note_prefix: optional("LINK_NOTE_PREFIX")
            .unwrap_or_else(|| "Payment link:".to_string()),
    };

    let idempotency = Idempotency {
        ttl_secs: parse_or::<i64>("IDEMPOTENCY_TTL_SECS", 900)?.max(1),
    };

    Ok(DotEnvyConfig {
        worker_server,
        database,
        stripe,
        sales,
        admin,
        discovery,
        idempotency,
    })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{key} is required"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw.parse::<T>().with_context(|| format!("{key} is invalid")),
        None => Ok(default),
    }
}

fn parse_status_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|status| status.trim().to_ascii_uppercase())
        .filter(|status| !status.is_empty())
        .collect()
}

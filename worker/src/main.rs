use anyhow::Result;
use chrono::Duration as ChronoDuration;
use crates::domain::repositories::{
    idempotency_keys::IdempotencyKeyRepository, payment_platform::PaymentPlatform,
    payment_postings::PaymentPostingRepository, sale_payment_links::SalePaymentLinkRepository,
    sales_platform::SalesPlatform, webhook_events::WebhookEventRepository,
};
use crates::infra::db::{
    postgres::{migrations, postgres_connection},
    repositories::{
        idempotency_keys::IdempotencyKeyPostgres, payment_postings::PaymentPostingPostgres,
        sale_payment_links::SalePaymentLinkPostgres, webhook_events::WebhookEventPostgres,
    },
};
use crates::payments::{
    sales_client::{SalesClient, SalesCredentials},
    stripe_client::StripeClient,
};
use paylink_worker::{
    axum_http::http_serve::{self, HttpDependencies},
    config,
    metrics::SyncMetrics,
    services::worker_loop::SaleDiscoveryWorker,
    usecases::{
        admin::AdminUseCase,
        idempotency_guard::IdempotencyGuard,
        payment_posting::PaymentPoster,
        payment_webhook::PaymentWebhookUseCase,
        sale_discovery::{DiscoverySettings, SaleDiscoveryUseCase},
    },
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {:#}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("paylink-worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");
    let db_pool_arc = Arc::new(postgres_pool);

    if dotenvy_env.database.run_migrations {
        migrations::run_pending_migrations(&db_pool_arc)?;
    }

    let metrics = Arc::new(SyncMetrics::new());

    let link_repository: Arc<dyn SalePaymentLinkRepository + Send + Sync> =
        Arc::new(SalePaymentLinkPostgres::new(Arc::clone(&db_pool_arc)));
    let event_repository: Arc<dyn WebhookEventRepository + Send + Sync> =
        Arc::new(WebhookEventPostgres::new(Arc::clone(&db_pool_arc)));
    let posting_repository: Arc<dyn PaymentPostingRepository + Send + Sync> =
        Arc::new(PaymentPostingPostgres::new(Arc::clone(&db_pool_arc)));
    let key_repository: Arc<dyn IdempotencyKeyRepository + Send + Sync> =
        Arc::new(IdempotencyKeyPostgres::new(Arc::clone(&db_pool_arc)));

    let stripe = &dotenvy_env.stripe;
    let payment_platform: Arc<dyn PaymentPlatform + Send + Sync> = Arc::new(StripeClient::new(
        stripe.api_base.clone(),
        stripe.secret_key.clone(),
        stripe.webhook_secret.clone(),
        stripe.webhook_tolerance_secs,
    )?);

    let sales = &dotenvy_env.sales;
    let credentials = match (&sales.account_id, &sales.application_key) {
        (Some(account_id), Some(application_key)) => Some(SalesCredentials {
            account_id: account_id.clone(),
            application_key: application_key.clone(),
        }),
        _ => None,
    };
    let sales_platform: Arc<dyn SalesPlatform + Send + Sync> = Arc::new(SalesClient::new(
        sales.api_base.clone(),
        credentials,
        sales.payment_account.clone(),
    )?);
    if !sales_platform.has_credentials() {
        warn!("Sales credentials are not configured; discovery cycles will be skipped");
    }

    let guard = Arc::new(IdempotencyGuard::new(
        key_repository,
        ChronoDuration::seconds(dotenvy_env.idempotency.ttl_secs),
    ));

    let poster = Arc::new(PaymentPoster::new(
        Arc::clone(&posting_repository),
        Arc::clone(&link_repository),
        Arc::clone(&sales_platform),
        Arc::clone(&metrics),
    ));

    let discovery = &dotenvy_env.discovery;
    let webhook_usecase = Arc::new(PaymentWebhookUseCase::new(
        Arc::clone(&payment_platform),
        Arc::clone(&event_repository),
        Arc::clone(&poster),
        Arc::clone(&metrics),
        discovery.default_currency.clone(),
    ));

    let admin_usecase = Arc::new(AdminUseCase::new(
        Arc::clone(&event_repository),
        Arc::clone(&posting_repository),
        Arc::clone(&link_repository),
        Arc::clone(&guard),
        Arc::clone(&poster),
        Arc::clone(&webhook_usecase),
    ));

    let discovery_usecase = Arc::new(SaleDiscoveryUseCase::new(
        Arc::clone(&sales_platform),
        Arc::clone(&payment_platform),
        Arc::clone(&link_repository),
        Arc::clone(&guard),
        Arc::clone(&metrics),
        DiscoverySettings {
            lookback_days: discovery.lookback_days,
            batch_size: discovery.batch_size,
            eligible_statuses: discovery.eligible_statuses.clone(),
            default_currency: discovery.default_currency.clone(),
            link_note_prefix: discovery.link_note_prefix.clone(),
        },
    ));

    let worker = SaleDiscoveryWorker::new(
        discovery_usecase,
        Duration::from_secs(discovery.interval_secs),
    );
    if discovery.enabled {
        worker.start().await;
    } else {
        info!("Sale discovery worker is disabled");
    }

    if dotenvy_env.admin.token.is_none() {
        warn!("ADMIN_TOKEN is not set; admin routes will answer 503");
    }

    let shutdown = CancellationToken::new();
    let signal_listener = tokio::spawn(http_serve::shutdown_signal(shutdown.clone()));

    let served = http_serve::start(
        Arc::clone(&dotenvy_env),
        HttpDependencies {
            webhook_usecase,
            admin_usecase,
            metrics,
            admin_token: dotenvy_env.admin.token.clone(),
        },
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    worker.stop().await;
    signal_listener.abort();

    served
}

use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    metrics::SyncMetrics,
    usecases::{admin::AdminUseCase, payment_webhook::PaymentWebhookUseCase},
};
use anyhow::Result;
use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct HttpDependencies {
    pub webhook_usecase: Arc<PaymentWebhookUseCase>,
    pub admin_usecase: Arc<AdminUseCase>,
    pub metrics: Arc<SyncMetrics>,
    pub admin_token: Option<String>,
}

/// Route tree without transport layers; tests drive it with `oneshot`.
pub fn build_router(deps: HttpDependencies) -> Router {
    let metrics_routes = Router::new()
        .route("/metrics", get(default_routers::metrics_text))
        .route("/metrics/json", get(default_routers::metrics_json))
        .with_state(Arc::clone(&deps.metrics));

    Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/webhooks",
            routers::payment_webhook::routes(deps.webhook_usecase),
        )
        .nest(
            "/admin",
            routers::admin::routes(deps.admin_token, deps.admin_usecase),
        )
        .merge(metrics_routes)
        .route("/health-check", get(default_routers::health_check))
}

pub async fn start(
    config: Arc<DotEnvyConfig>,
    deps: HttpDependencies,
    shutdown: CancellationToken,
) -> Result<()> {
    let allowed_origins: Vec<HeaderValue> = vec![
        "http://localhost".parse()?,
        "http://127.0.0.1".parse()?,
        "http://localhost:3000".parse()?,
        "http://127.0.0.1:3000".parse()?,
    ];

    let app = build_router(deps)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.worker_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.worker_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([
                    AUTHORIZATION,
                    CONTENT_TYPE,
                    HeaderName::from_static(routers::admin::ADMIN_TOKEN_HEADER),
                ])
                .allow_origin(allowed_origins),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.worker_server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM and cancels `token`.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = token.cancelled() => {},
        _ = terminate => info!("Received terminate signal"),
    }

    token.cancel();
}

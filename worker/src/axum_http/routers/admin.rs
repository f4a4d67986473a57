use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use crates::domain::value_objects::admin::{
    ForceLinkStatusRequest, ForceRequest, Pagination, ReconcileQuery,
};
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::{
    axum_http::error_responses::AppError,
    usecases::{admin::AdminUseCase, sync_error::SyncError},
};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT/admin/webhook-events/evt_123/replay" \
//     -H "X-Admin-Token: $ADMIN_TOKEN" \
//     -H "Content-Type: application/json" \
//     -d '{"force":true}'

#[derive(Clone)]
pub struct AdminRouteState {
    token: Option<Arc<str>>,
    usecase: Arc<AdminUseCase>,
}

pub fn routes(token: Option<String>, usecase: Arc<AdminUseCase>) -> Router {
    let state = AdminRouteState {
        token: token.map(Arc::from),
        usecase,
    };

    Router::new()
        .route("/webhook-events/:event_id/replay", post(replay_event))
        .route("/payment-postings/unposted", get(list_unposted))
        .route("/payment-postings/:posting_id/retry", post(retry_posting))
        .route("/reconcile", get(reconcile))
        .route("/payment-links/:sale_id", get(get_link))
        .route("/payment-links/:sale_id/status", post(force_link_status))
        .route(
            "/idempotency-keys/expired",
            get(expired_keys).delete(purge_expired_keys),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ))
        .with_state(state)
}

async fn require_admin_token(
    State(state): State<AdminRouteState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return AppError::AdminDisabled.into_response();
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    match provided {
        Some(token) if token_matches(token, expected) => {
            next.run(request).await
        }
        _ => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "admin: rejected request with missing or invalid token"
            );
            AppError::from(SyncError::Unauthorized).into_response()
        }
    }
}

/// Slices of different length compare unequal; the token length is not secret.
fn token_matches(provided: &str, expected: &str) -> bool {
    provided.trim().as_bytes().ct_eq(expected.as_bytes()).into()
}

pub async fn replay_event(
    State(state): State<AdminRouteState>,
    Path(event_id): Path<String>,
    body: Option<Json<ForceRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    Ok(Json(state.usecase.replay_event(&event_id, force).await?))
}

pub async fn list_unposted(
    State(state): State<AdminRouteState>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.usecase.list_unposted(page).await?))
}

pub async fn retry_posting(
    State(state): State<AdminRouteState>,
    Path(posting_id): Path<String>,
    body: Option<Json<ForceRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let posting_id = Uuid::parse_str(&posting_id)
        .map_err(|_| SyncError::validation(format!("invalid posting id: {posting_id}")))?;
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    Ok(Json(state.usecase.retry_posting(posting_id, force).await?))
}

pub async fn reconcile(
    State(state): State<AdminRouteState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.usecase.reconcile(query).await?))
}

pub async fn get_link(
    State(state): State<AdminRouteState>,
    Path(sale_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.usecase.get_link(&sale_id).await?))
}

pub async fn force_link_status(
    State(state): State<AdminRouteState>,
    Path(sale_id): Path<String>,
    body: Option<Json<ForceLinkStatusRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Some(Json(request)) = body else {
        return Err(SyncError::validation("body with `status` is required").into());
    };
    Ok(Json(state.usecase.force_link_status(&sale_id, request).await?))
}

pub async fn expired_keys(
    State(state): State<AdminRouteState>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.usecase.expired_keys(page).await?))
}

pub async fn purge_expired_keys(
    State(state): State<AdminRouteState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.usecase.purge_expired_keys().await?))
}

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use crates::domain::value_objects::payment_webhook::SIGNATURE_HEADER;
use serde_json::json;

use crate::{
    axum_http::error_responses::AppError,
    usecases::payment_webhook::{IngestOutcome, PaymentWebhookUseCase},
};

pub fn routes(usecase: Arc<PaymentWebhookUseCase>) -> Router {
    Router::new()
        .route("/stripe", post(receive))
        .with_state(usecase)
}

/// Acknowledges as soon as the event row is stored; side effects run in the background.
pub async fn receive(
    State(usecase): State<Arc<PaymentWebhookUseCase>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match usecase.ingest(&body, signature).await {
        Ok(IngestOutcome::Accepted { event_id }) => {
            usecase.spawn_processing(event_id.clone());
            (
                StatusCode::OK,
                Json(json!({ "received": true, "event_id": event_id })),
            )
                .into_response()
        }
        Ok(IngestOutcome::Duplicate { event_id }) => (
            StatusCode::OK,
            Json(json!({ "received": true, "event_id": event_id, "duplicate": true })),
        )
            .into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

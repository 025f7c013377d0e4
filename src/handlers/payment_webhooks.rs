use crate::{
    errors::ServiceError,
    services::{orders::WebhookOutcome, payments},
    AppState,
};
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use serde_json::json;
use tracing::warn;

/// POST /api/v1/payments/webhook
///
/// Gateway callback. Signature verification is the only step that may reject
/// the call; once the payload is trusted, unknown event types and replayed
/// deliveries are acknowledged so the gateway stops retrying, while commit
/// failures surface as 5xx to trigger a retry.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok());

    let event = match payments::verify_webhook(
        &body,
        signature,
        &state.config.webhook_secret,
        state.config.webhook_tolerance_secs,
    ) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Rejecting webhook delivery");
            return Err(e);
        }
    };

    let outcome = state.services.materializer.process_event(&event).await?;

    let body = match outcome {
        WebhookOutcome::Completed { order_ids } => json!({
            "status": "completed",
            "order_ids": order_ids,
        }),
        WebhookOutcome::Skipped => json!({ "status": "skipped" }),
        WebhookOutcome::Ignored => json!({ "status": "ignored" }),
    };

    Ok(Json(body))
}

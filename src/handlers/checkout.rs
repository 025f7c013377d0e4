use crate::{
    errors::ServiceError,
    events::Event,
    services::sessions::CreateSessionInput,
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;
use utoipa::ToSchema;

/// POST /api/v1/checkout/sessions
///
/// Creates (or reuses) the caller's checkout session. Identical carts —
/// regardless of line order — return the existing session id instead of
/// minting a second in-flight checkout.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions",
    request_body = CreateSessionInput,
    responses(
        (status = 201, description = "Session created or reused"),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let handle = state.services.sessions.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(handle))))
}

/// GET /api/v1/checkout/sessions/{id}
///
/// Returns the session payload, or 404 once it has been consumed or its TTL
/// elapsed — the client's cue to restart checkout.
#[utoipa::path(
    get,
    path = "/api/v1/checkout/sessions/{id}",
    params(("id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Session payload"),
        (status = 404, description = "Unknown or expired session", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.sessions.verify(&session_id).await?;
    Ok(Json(ApiResponse::success(session)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    /// Amount the client believes it is paying; must equal the session total
    pub amount: Decimal,
}

/// POST /api/v1/checkout/sessions/{id}/intent
///
/// Creates a payment intent for the session: amount fixed server-side,
/// platform fee split off, charge routed to the seller's connected account.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{id}/intent",
    params(("id" = String, Path, description = "Checkout session id")),
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created; body carries the client secret"),
        (status = 404, description = "Unknown or expired session", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.sessions.verify(&session_id).await?;
    let intent = state
        .services
        .payments
        .create_intent_for_session(&session, payload.amount)
        .await?;

    if let Err(e) = state
        .event_sender
        .send(Event::PaymentIntentCreated {
            session_id: session.session_id.clone(),
            intent_id: intent.intent_id.clone(),
        })
        .await
    {
        warn!(error = %e, "Failed to send payment intent event");
    }

    Ok(Json(ApiResponse::success(intent)))
}

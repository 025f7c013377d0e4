use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        version = "0.1.0",
        description = r#"
# Marketplace Checkout API

The checkout-to-order pipeline of a multi-seller marketplace.

## Flow

1. `POST /api/v1/checkout/sessions` — snapshot the cart into a short-lived
   checkout session (identical carts are deduplicated).
2. `POST /api/v1/checkout/sessions/{id}/intent` — create a payment intent
   with the platform fee split off.
3. The client completes payment with the gateway.
4. `POST /api/v1/payments/webhook` — the gateway's signed callback
   materializes the session into one paid order per seller.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Checkout session and intent endpoints"),
        (name = "Payments", description = "Payment gateway callbacks")
    ),
    paths(
        crate::handlers::checkout::create_session,
        crate::handlers::checkout::get_session,
        crate::handlers::checkout::create_intent,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::services::sessions::CreateSessionInput,
            crate::services::sessions::CartLineInput,
            crate::services::sessions::Coupon,
            crate::handlers::checkout::CreateIntentRequest,
            crate::errors::ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

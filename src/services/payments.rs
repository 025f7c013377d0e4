//! Payment gateway adapter: intent creation with a platform-fee split, and
//! webhook signature verification. Amounts are fixed at intent-creation time;
//! webhook-time logic only reacts to success or failure.

use crate::{errors::ServiceError, services::sessions::CheckoutSession};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Gateway event type that triggers order materialization. Every other type
/// is acknowledged without side effects.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Opaque metadata embedded in each payment intent so the asynchronous
/// webhook can recover checkout context without any other lookup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub session_id: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    /// Amount in the smallest currency unit
    pub amount_minor: i64,
    pub currency: String,
    /// Platform fee retained from the charge, in the smallest currency unit
    pub application_fee_minor: i64,
    /// Connected gateway account the charge is routed to
    pub destination_account: String,
    pub metadata: IntentMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Verified webhook event envelope. `data.object` stays untyped until the
/// event type filter has run, since only payment intents carry our metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    pub metadata: IntentMetadata,
}

impl GatewayEvent {
    /// Decodes `data.object` as a payment intent. Call only after the event
    /// type filter has selected a payment-intent event.
    pub fn payment_intent(&self) -> Result<PaymentIntentObject, ServiceError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| ServiceError::BadRequest(format!("malformed payment intent: {}", e)))
    }
}

/// Thin client boundary to the external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// HTTP implementation speaking the processor's form-encoded API.
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            secret_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let amount = request.amount_minor.to_string();
        let fee = request.application_fee_minor.to_string();
        let user_id = request.metadata.user_id.to_string();

        let params = [
            ("amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("application_fee_amount", fee.as_str()),
            ("transfer_data[destination]", request.destination_account.as_str()),
            ("metadata[session_id]", request.metadata.session_id.as_str()),
            ("metadata[user_id]", user_id.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Payment gateway request failed");
                ServiceError::Gateway(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Payment gateway rejected intent");
            return Err(ServiceError::Gateway(format!(
                "gateway returned {}",
                status
            )));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| ServiceError::Gateway(format!("unreadable gateway response: {}", e)))
    }
}

/// Platform fee in minor units: a fixed percentage of the charge, floored.
pub fn platform_fee(amount_minor: i64, fee_percent: u32) -> i64 {
    amount_minor * i64::from(fee_percent) / 100
}

/// Converts a decimal amount to the gateway's smallest currency unit.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round_dp(0)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount {} out of gateway range", amount))
        })
}

/// Intent-creation facade over the gateway client.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    fee_percent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentResponse {
    pub intent_id: String,
    pub client_secret: String,
}

impl PaymentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, currency: String, fee_percent: u32) -> Self {
        Self {
            gateway,
            currency,
            fee_percent,
        }
    }

    /// Creates a payment intent for a verified session. The charged amount
    /// comes from the session, not the client; a mismatching client amount is
    /// rejected so stale frontends fail loudly instead of charging the wrong
    /// figure.
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    pub async fn create_intent_for_session(
        &self,
        session: &CheckoutSession,
        expected_amount: Decimal,
    ) -> Result<IntentResponse, ServiceError> {
        if expected_amount != session.total_amount {
            return Err(ServiceError::InvalidOperation(format!(
                "amount {} does not match session total {}",
                expected_amount, session.total_amount
            )));
        }

        let first_line = session.cart.first().ok_or_else(|| {
            ServiceError::InternalError("session contains an empty cart".into())
        })?;
        let destination = session
            .sellers
            .get(&first_line.shop_id)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "session missing seller mapping for shop {}",
                    first_line.shop_id
                ))
            })?
            .gateway_account_id
            .clone();

        let amount_minor = to_minor_units(session.total_amount)?;
        let intent = self
            .gateway
            .create_intent(CreateIntentRequest {
                amount_minor,
                currency: self.currency.clone(),
                application_fee_minor: platform_fee(amount_minor, self.fee_percent),
                destination_account: destination,
                metadata: IntentMetadata {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id,
                },
            })
            .await?;

        Ok(IntentResponse {
            intent_id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}

/// Verifies an inbound webhook payload against its signature header and
/// parses the event. This is the trust boundary against payload forgery: no
/// payload is interpreted before the HMAC matches.
///
/// Header format: `t=<unix-ts>,v1=<hex hmac-sha256 of "{t}.{payload}">`.
pub fn verify_webhook(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
) -> Result<GatewayEvent, ServiceError> {
    let header = signature_header
        .ok_or_else(|| ServiceError::SignatureVerification("missing signature header".into()))?;

    let mut timestamp = "";
    let mut signature = "";
    for part in header.split(',') {
        let mut it = part.trim().split('=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => signature = val,
            _ => {}
        }
    }
    if timestamp.is_empty() || signature.is_empty() {
        return Err(ServiceError::SignatureVerification(
            "malformed signature header".into(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::SignatureVerification("non-numeric timestamp".into()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        warn!(timestamp = ts, "Webhook signature timestamp outside tolerance");
        return Err(ServiceError::SignatureVerification(
            "timestamp outside tolerance".into(),
        ));
    }

    let signed = format!(
        "{}.{}",
        timestamp,
        std::str::from_utf8(payload).unwrap_or("")
    );
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::SignatureVerification("invalid secret".into()))?;
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(&expected, signature) {
        return Err(ServiceError::SignatureVerification(
            "signature mismatch".into(),
        ));
    }

    serde_json::from_slice(payload)
        .map_err(|e| ServiceError::BadRequest(format!("invalid event payload: {}", e)))
}

/// Computes the signature header for a payload, as the gateway would. Used by
/// tests and local replay tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signed = format!(
        "{}.{}",
        timestamp,
        std::str::from_utf8(payload).unwrap_or("")
    );
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(signed.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Method, Request, Response},
    Router,
};
use chrono::Utc;
use marketplace_api::{
    cache::InMemoryCache,
    config::AppConfig,
    entities::{product, shop, user},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    migrator::Migrator,
    services::email::NullEmailSender,
    services::payments::{
        sign_payload, CreateIntentRequest, PaymentGateway, PaymentIntent,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Gateway double: answers every intent request with a canned secret and
/// records what it was asked to create.
#[derive(Default)]
pub struct RecordingGateway {
    pub requests: Mutex<Vec<CreateIntentRequest>>,
}

#[async_trait::async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let n = requests.len();
        Ok(PaymentIntent {
            id: format!("pi_test_{}", n),
            client_secret: format!("pi_test_{}_secret", n),
        })
    }
}

/// Helper harness: application state backed by an in-memory SQLite database,
/// the in-memory cache backend, and a recording gateway double.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    #[allow(dead_code)]
    pub cache: Arc<InMemoryCache>,
    pub gateway: Arc<RecordingGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_session_ttl(600).await
    }

    /// Construct a new test application with fresh database state.
    pub async fn with_session_ttl(session_ttl_secs: u64) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.session_ttl_secs = session_ttl_secs;

        // A single pooled connection keeps every query on the same in-memory
        // SQLite database.
        let mut opts = ConnectOptions::new(cfg.database_url.clone());
        opts.max_connections(1).min_connections(1);
        let db = Database::connect(opts).await.expect("sqlite connection");
        Migrator::up(&db, None).await.expect("migrations");
        let db = Arc::new(db);

        let cache = Arc::new(InMemoryCache::new());
        let gateway = Arc::new(RecordingGateway::default());

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db.clone(),
            cache.clone(),
            gateway.clone(),
            Arc::new(NullEmailSender),
            Arc::new(event_sender.clone()),
            &cfg,
        );

        let redis_client =
            Arc::new(redis::Client::open(cfg.redis_url.clone()).expect("redis client"));

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
            redis: redis_client,
        };

        let router = Router::new()
            .nest("/api/v1", marketplace_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            cache,
            gateway,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request");

        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Posts a signed webhook delivery the way the gateway would.
    pub async fn post_webhook(&self, payload: &Value) -> Response<Body> {
        let body = payload.to_string();
        let signature = sign_payload(
            body.as_bytes(),
            &self.state.config.webhook_secret,
            Utc::now().timestamp(),
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("Stripe-Signature", signature)
            .body(Body::from(body))
            .expect("request");

        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Posts a webhook body with a caller-supplied signature header.
    pub async fn post_webhook_with_signature(
        &self,
        body: String,
        signature: &str,
    ) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("Stripe-Signature", signature)
            .body(Body::from(body))
            .expect("request");

        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn seed_user(&self, name: &str, email: &str) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_shop(&self, name: &str, gateway_account_id: &str) -> shop::Model {
        shop::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            owner_id: Set(Uuid::new_v4()),
            gateway_account_id: Set(gateway_account_id.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed shop")
    }

    pub async fn seed_product(
        &self,
        shop_id: Uuid,
        name: &str,
        unit_price: Decimal,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(shop_id),
            name: Set(name.to_string()),
            unit_price: Set(unit_price),
            stock: Set(stock),
            sold_count: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Builds a `payment_intent.succeeded` event payload carrying the checkout
/// metadata, as the gateway emits it.
pub fn payment_succeeded_event(session_id: &str, user_id: Uuid, amount_minor: i64) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": format!("pi_{}", Uuid::new_v4().simple()),
                "amount": amount_minor,
                "metadata": {
                    "session_id": session_id,
                    "user_id": user_id,
                }
            }
        }
    })
}

use crate::{
    cache::CacheBackend,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        email::EmailSender,
        inventory::InventoryService,
        notifications::NotificationService,
        orders::OrderMaterializer,
        payments::{PaymentGateway, PaymentService},
        sessions::CheckoutSessionService,
    },
};
use std::sync::Arc;
use std::time::Duration;

pub mod checkout;
pub mod payment_webhooks;

/// Aggregate of the services HTTP handlers depend on.
#[derive(Clone)]
pub struct AppServices {
    pub sessions: Arc<CheckoutSessionService>,
    pub payments: Arc<PaymentService>,
    pub materializer: Arc<OrderMaterializer>,
    pub inventory: Arc<InventoryService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    /// Wires the service graph from its injected edges: the store, the
    /// session cache, the payment gateway, and the email sender.
    pub fn new(
        db_pool: Arc<DbPool>,
        cache: Arc<dyn CacheBackend>,
        gateway: Arc<dyn PaymentGateway>,
        email: Arc<dyn EmailSender>,
        event_sender: Arc<EventSender>,
        cfg: &AppConfig,
    ) -> Self {
        let sessions = Arc::new(CheckoutSessionService::new(
            cache,
            db_pool.clone(),
            event_sender.clone(),
            Duration::from_secs(cfg.session_ttl_secs),
        ));
        let payments = Arc::new(PaymentService::new(
            gateway,
            cfg.currency.clone(),
            cfg.platform_fee_percent,
        ));
        let inventory = Arc::new(InventoryService::new(db_pool.clone()));
        let notifications = Arc::new(NotificationService::new(db_pool.clone()));
        let materializer = Arc::new(OrderMaterializer::new(
            db_pool,
            sessions.clone(),
            inventory.clone(),
            notifications.clone(),
            email,
            event_sender,
            cfg.dashboard_url.clone(),
        ));

        Self {
            sessions,
            payments,
            materializer,
            inventory,
            notifications,
        }
    }
}

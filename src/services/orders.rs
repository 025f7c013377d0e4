//! Order materialization: the webhook-driven conversion of a paid checkout
//! session into durable per-seller orders. Shop groups are committed
//! sequentially, each in its own transaction guarded by a saga marker, so a
//! retried delivery resumes where the failed one stopped instead of
//! duplicating committed groups.

use crate::{
    entities::{checkout_commit, order, order_item, user},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        email::EmailSender,
        inventory::{InventoryService, PurchaseAction},
        notifications::{NotificationService, Receiver},
        payments::{GatewayEvent, EVENT_PAYMENT_SUCCEEDED},
        sessions::{CartLine, CheckoutSession, CheckoutSessionService, Coupon},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Terminal outcome of one webhook delivery. All three acknowledge with 2xx;
/// the distinction is surfaced in the response body and the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Session found; orders now exist for every shop group.
    Completed { order_ids: Vec<Uuid> },
    /// No session for the event: already materialized or TTL-expired.
    Skipped,
    /// Event type does not trigger materialization.
    Ignored,
}

/// Split the cart into one group per shop, preserving first-seen shop order
/// so processing (and any partial failure) is deterministic.
pub fn split_by_shop(cart: &[CartLine]) -> Vec<(Uuid, Vec<CartLine>)> {
    let mut groups: Vec<(Uuid, Vec<CartLine>)> = Vec::new();
    for line in cart {
        match groups.iter_mut().find(|(shop_id, _)| *shop_id == line.shop_id) {
            Some((_, lines)) => lines.push(line.clone()),
            None => groups.push((line.shop_id, vec![line.clone()])),
        }
    }
    groups
}

/// Pricing of one shop group after coupon application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPricing {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub coupon_code: Option<String>,
}

impl GroupPricing {
    pub fn total(&self) -> Decimal {
        self.subtotal - self.discount
    }
}

/// Computes a group's subtotal and the coupon discount, if the coupon targets
/// a product in this group. A coupon discounts exactly one group — the one
/// containing its target product — and a flat discount is clamped to the
/// subtotal so totals never go negative.
pub fn group_pricing(lines: &[CartLine], coupon: Option<&Coupon>) -> GroupPricing {
    let subtotal: Decimal = lines
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum();

    let mut discount = Decimal::ZERO;
    let mut coupon_code = None;

    if let Some(coupon) = coupon {
        if let Some(target) = lines.iter().find(|l| l.product_id == coupon.product_id()) {
            match coupon {
                Coupon::Percent { percent, code, .. } => {
                    discount = (target.unit_price * Decimal::from(target.quantity) * *percent
                        / Decimal::from(100))
                    .round_dp(2);
                    coupon_code = Some(code.clone());
                }
                Coupon::Flat { amount, code, .. } => {
                    discount = (*amount).min(subtotal);
                    coupon_code = Some(code.clone());
                }
            }
        }
    }

    GroupPricing {
        subtotal,
        discount,
        coupon_code,
    }
}

/// Webhook handler core. Consumes verified gateway events and produces
/// durable orders plus best-effort fan-out.
#[derive(Clone)]
pub struct OrderMaterializer {
    db: Arc<DatabaseConnection>,
    sessions: Arc<CheckoutSessionService>,
    inventory: Arc<InventoryService>,
    notifications: Arc<NotificationService>,
    email: Arc<dyn EmailSender>,
    event_sender: Arc<EventSender>,
    dashboard_url: String,
}

impl OrderMaterializer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sessions: Arc<CheckoutSessionService>,
        inventory: Arc<InventoryService>,
        notifications: Arc<NotificationService>,
        email: Arc<dyn EmailSender>,
        event_sender: Arc<EventSender>,
        dashboard_url: String,
    ) -> Self {
        Self {
            db,
            sessions,
            inventory,
            notifications,
            email,
            event_sender,
            dashboard_url,
        }
    }

    /// Processes one verified gateway event. Any error during per-shop commit
    /// propagates to the caller, which answers non-2xx so the gateway
    /// retries; the saga markers make that retry skip groups that already
    /// committed. The session is deleted only after every group succeeded,
    /// which is what makes a replayed event after full success a no-op.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<WebhookOutcome, ServiceError> {
        if event.event_type != EVENT_PAYMENT_SUCCEEDED {
            info!("Ignoring unhandled gateway event type");
            return Ok(WebhookOutcome::Ignored);
        }

        let intent = event.payment_intent()?;
        let session = match self.sessions.verify(&intent.metadata.session_id).await {
            Ok(session) => session,
            Err(ServiceError::SessionNotFound(_)) => {
                info!(
                    session_id = %intent.metadata.session_id,
                    "No session for payment event; treating delivery as replay"
                );
                return Ok(WebhookOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let groups = split_by_shop(&session.cart);
        let mut order_ids = Vec::with_capacity(groups.len());

        for (shop_id, lines) in &groups {
            match self.commit_shop_group(&session, *shop_id, lines).await? {
                CommitResult::Committed { order_id, total } => {
                    order_ids.push(order_id);
                    self.dispatch_fanout(&session, *shop_id, order_id, total);
                }
                CommitResult::AlreadyCommitted { order_id } => {
                    info!(
                        order_id = %order_id,
                        shop_id = %shop_id,
                        "Shop group already committed; skipping"
                    );
                    order_ids.push(order_id);
                }
            }
        }

        // Single-use guarantee: only reached when every group committed
        self.sessions.delete(&session.session_id).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::OrderMaterialized {
                session_id: session.session_id.clone(),
                order_ids: order_ids.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send order materialized event");
        }

        info!(
            session_id = %session.session_id,
            order_count = order_ids.len(),
            "Checkout session materialized"
        );
        Ok(WebhookOutcome::Completed { order_ids })
    }

    /// Persists one shop group: saga marker, order, items, stock and
    /// analytics updates, all in one transaction. The unique
    /// (session, shop) index on the marker table is the backstop against
    /// concurrent duplicate deliveries racing past the existence check.
    async fn commit_shop_group(
        &self,
        session: &CheckoutSession,
        shop_id: Uuid,
        lines: &[CartLine],
    ) -> Result<CommitResult, ServiceError> {
        let txn = self.db.begin().await?;

        if let Some(marker) = checkout_commit::Entity::find()
            .filter(checkout_commit::Column::SessionId.eq(session.session_id.as_str()))
            .filter(checkout_commit::Column::ShopId.eq(shop_id))
            .one(&txn)
            .await?
        {
            txn.rollback().await?;
            return Ok(CommitResult::AlreadyCommitted {
                order_id: marker.order_id,
            });
        }

        let pricing = group_pricing(lines, session.coupon.as_ref());
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(session.user_id),
            shop_id: Set(shop_id),
            session_id: Set(session.session_id.clone()),
            total: Set(pricing.total()),
            status: Set(order::STATUS_PAID.to_string()),
            shipping_address_id: Set(session.shipping_address_id),
            coupon_code: Set(pricing.coupon_code.clone()),
            discount_amount: Set(pricing.discount),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        order_model.insert(&txn).await?;

        for line in lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                selected_options: Set(line.selected_options.clone()),
                created_at: Set(now),
            };
            item.insert(&txn).await?;

            self.inventory
                .decrement_stock(&txn, line.product_id, line.quantity)
                .await?;
            self.inventory
                .upsert_product_analytics(&txn, line.product_id, shop_id, line.quantity)
                .await?;
            self.inventory
                .append_user_action(
                    &txn,
                    session.user_id,
                    PurchaseAction::purchase(line.product_id, shop_id),
                )
                .await?;
        }

        let marker = checkout_commit::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.session_id.clone()),
            shop_id: Set(shop_id),
            order_id: Set(order_id),
            created_at: Set(now),
        };
        marker.insert(&txn).await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            shop_id = %shop_id,
            total = %pricing.total(),
            "Order committed"
        );
        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(error = %e, order_id = %order_id, "Failed to send order created event");
        }

        Ok(CommitResult::Committed {
            order_id,
            total: pricing.total(),
        })
    }

    /// Best-effort post-commit side effects: buyer confirmation email plus
    /// seller and admin notifications. Runs detached from the webhook task so
    /// a slow SMTP relay or a failed insert can never roll back a committed
    /// order or fail the delivery.
    fn dispatch_fanout(
        &self,
        session: &CheckoutSession,
        shop_id: Uuid,
        order_id: Uuid,
        total: Decimal,
    ) {
        let db = self.db.clone();
        let email = self.email.clone();
        let notifications = self.notifications.clone();
        let seller_id = session.sellers.get(&shop_id).map(|s| s.seller_id);
        let user_id = session.user_id;
        let session_id = session.session_id.clone();
        let redirect_link = format!("{}/orders/{}", self.dashboard_url, order_id);

        tokio::spawn(async move {
            match user::Entity::find_by_id(user_id).one(&*db).await {
                Ok(Some(buyer)) => {
                    let body = format!(
                        "Hi {},\n\nYour payment went through and order {} is confirmed.\nOrder total: {}.\n\nThank you for shopping with us.",
                        buyer.name, order_id, total
                    );
                    if let Err(e) = email.send(&buyer.email, "Your order is confirmed", &body).await
                    {
                        warn!(error = %e, order_id = %order_id, "Order confirmation email failed");
                    }
                }
                Ok(None) => {
                    warn!(user_id = %user_id, "Buyer not found; skipping confirmation email");
                }
                Err(e) => {
                    warn!(error = %e, user_id = %user_id, "Buyer lookup failed; skipping confirmation email");
                }
            }

            if let Some(seller_id) = seller_id {
                if let Err(e) = notifications
                    .notify(
                        Receiver::Seller(seller_id),
                        user_id,
                        "New order received",
                        &format!("A new paid order {} was placed in your shop.", order_id),
                        &redirect_link,
                    )
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Seller notification failed");
                }
            } else {
                warn!(shop_id = %shop_id, "No seller mapping in session; skipping seller notification");
            }

            if let Err(e) = notifications
                .notify(
                    Receiver::Admin,
                    user_id,
                    "New marketplace order",
                    &format!(
                        "Order {} (session {}) was materialized for a total of {}.",
                        order_id, session_id, total
                    ),
                    &redirect_link,
                )
                .await
            {
                warn!(error = %e, order_id = %order_id, "Admin notification failed");
            }
        });
    }
}

enum CommitResult {
    Committed { order_id: Uuid, total: Decimal },
    AlreadyCommitted { order_id: Uuid },
}

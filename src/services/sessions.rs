//! Checkout sessions: short-lived, cache-resident snapshots of a cart
//! awaiting payment. One active checkout per user; identical carts are
//! deduplicated by a canonical fingerprint so repeated attempts reuse the
//! same session (and therefore the same payment intent).

use crate::{
    cache::CacheBackend,
    entities::{product, shop},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Cache key namespace for checkout sessions.
pub const SESSION_KEY_PREFIX: &str = "payment_session:";

fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// A cart line as submitted by the client. The submitted price and shop only
/// participate in the fingerprint; the authoritative values are re-read from
/// the catalog at session creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineInput {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub selected_options: Option<serde_json::Value>,
}

/// An authoritative cart line stored in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub selected_options: Option<serde_json::Value>,
}

/// Seller routing data resolved at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerAccount {
    pub seller_id: Uuid,
    pub gateway_account_id: String,
}

/// Coupon as a tagged variant: a coupon either discounts a product by a
/// percentage or by a flat amount, never both.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coupon {
    Percent {
        code: String,
        product_id: Uuid,
        percent: Decimal,
    },
    Flat {
        code: String,
        product_id: Uuid,
        amount: Decimal,
    },
}

impl Coupon {
    pub fn code(&self) -> &str {
        match self {
            Coupon::Percent { code, .. } | Coupon::Flat { code, .. } => code,
        }
    }

    pub fn product_id(&self) -> Uuid {
        match self {
            Coupon::Percent { product_id, .. } | Coupon::Flat { product_id, .. } => *product_id,
        }
    }
}

/// The cache-resident checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub cart_fingerprint: String,
    pub cart: Vec<CartLine>,
    pub sellers: HashMap<Uuid, SellerAccount>,
    pub total_amount: Decimal,
    pub shipping_address_id: Option<Uuid>,
    pub coupon: Option<Coupon>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSessionInput {
    pub user_id: Uuid,
    pub cart: Vec<CartLineInput>,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
    #[serde(default)]
    pub coupon: Option<Coupon>,
}

/// Result of a create call: either a freshly stored session or a reused one.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub reused: bool,
    pub total_amount: Decimal,
}

#[derive(Serialize)]
struct FingerprintLine<'a> {
    id: Uuid,
    quantity: i32,
    price: String,
    shop_id: Uuid,
    options: Option<&'a serde_json::Value>,
}

/// Canonical, order-independent fingerprint of cart contents. Lines are
/// projected to (id, quantity, price, shop, options) and sorted by product id
/// so two submissions of the same logical cart hash identically regardless of
/// client-side array order.
pub fn cart_fingerprint(cart: &[CartLineInput]) -> String {
    let mut lines: Vec<FingerprintLine<'_>> = cart
        .iter()
        .map(|line| FingerprintLine {
            id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price.normalize().to_string(),
            shop_id: line.shop_id,
            options: line.selected_options.as_ref(),
        })
        .collect();

    lines.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then_with(|| serde_json::to_string(&a.options).unwrap_or_default().cmp(
                &serde_json::to_string(&b.options).unwrap_or_default(),
            ))
    });

    let canonical = serde_json::to_string(&lines).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes[..]);
    format!("cs_{}", hex::encode(bytes))
}

/// Session manager: create-or-dedup, verify, delete. The cache is injected so
/// the store is swappable (Redis in production, in-memory in tests).
#[derive(Clone)]
pub struct CheckoutSessionService {
    cache: Arc<dyn CacheBackend>,
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    ttl: Duration,
}

impl CheckoutSessionService {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            db,
            event_sender,
            ttl,
        }
    }

    /// Creates a checkout session, or returns the user's existing one when
    /// the cart fingerprint matches. A stale session for the same user with a
    /// different fingerprint is evicted first: a user only ever has one
    /// active checkout.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, lines = input.cart.len()))]
    pub async fn create(&self, input: CreateSessionInput) -> Result<SessionHandle, ServiceError> {
        if input.cart.is_empty() {
            return Err(ServiceError::InvalidCart("cart must not be empty".into()));
        }
        if let Some(bad) = input.cart.iter().find(|line| line.quantity <= 0) {
            return Err(ServiceError::InvalidCart(format!(
                "quantity for product {} must be positive",
                bad.product_id
            )));
        }

        let fingerprint = cart_fingerprint(&input.cart);

        // Dedup / evict pass over the user's live sessions. The scan is
        // bounded by the number of in-flight checkouts across all users.
        if let Some(existing) = self
            .scan_user_sessions(input.user_id, &fingerprint)
            .await?
        {
            return Ok(existing);
        }

        let cart = self.resolve_cart(&input.cart).await?;
        let sellers = self.resolve_sellers(&cart).await?;

        let total_amount: Decimal = cart
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        let session = CheckoutSession {
            session_id: generate_session_id(),
            user_id: input.user_id,
            cart_fingerprint: fingerprint,
            cart,
            sellers,
            total_amount,
            shipping_address_id: input.shipping_address_id,
            coupon: input.coupon,
            created_at: Utc::now(),
        };

        let payload = serde_json::to_string(&session)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        self.cache
            .set(&session_key(&session.session_id), &payload, Some(self.ttl))
            .await?;

        info!(
            session_id = %session.session_id,
            total = %session.total_amount,
            "Checkout session created"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::CheckoutSessionCreated {
                session_id: session.session_id.clone(),
                user_id: session.user_id,
            })
            .await
        {
            warn!(error = %e, "Failed to send session created event");
        }

        Ok(SessionHandle {
            session_id: session.session_id,
            reused: false,
            total_amount: session.total_amount,
        })
    }

    /// Loads a session, failing with `SessionNotFound` when the key is absent
    /// or the TTL elapsed. Clients handle this by restarting checkout.
    pub async fn verify(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        let raw = self
            .cache
            .get(&session_key(session_id))
            .await?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        serde_json::from_str(&raw).map_err(|e| {
            ServiceError::InternalError(format!("corrupt session {}: {}", session_id, e))
        })
    }

    /// Removes a session. Called exactly once per materialized checkout.
    pub async fn delete(&self, session_id: &str) -> Result<(), ServiceError> {
        self.cache.delete(&session_key(session_id)).await?;
        Ok(())
    }

    async fn scan_user_sessions(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<SessionHandle>, ServiceError> {
        let keys = self.cache.keys(SESSION_KEY_PREFIX).await?;
        let mut reusable = None;

        for key in keys {
            let Some(raw) = self.cache.get(&key).await? else {
                continue;
            };
            let session: CheckoutSession = match serde_json::from_str(&raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping unreadable session entry");
                    self.cache.delete(&key).await?;
                    continue;
                }
            };
            if session.user_id != user_id {
                continue;
            }

            if session.cart_fingerprint == fingerprint {
                info!(session_id = %session.session_id, "Reusing checkout session for identical cart");
                if let Err(e) = self
                    .event_sender
                    .send(Event::CheckoutSessionReused {
                        session_id: session.session_id.clone(),
                        user_id,
                    })
                    .await
                {
                    warn!(error = %e, "Failed to send session reused event");
                }
                reusable = Some(SessionHandle {
                    session_id: session.session_id,
                    reused: true,
                    total_amount: session.total_amount,
                });
            } else {
                info!(session_id = %session.session_id, "Evicting stale checkout session");
                self.cache.delete(&key).await?;
                if let Err(e) = self
                    .event_sender
                    .send(Event::CheckoutSessionEvicted {
                        session_id: session.session_id.clone(),
                        user_id,
                    })
                    .await
                {
                    warn!(error = %e, "Failed to send session evicted event");
                }
            }
        }

        Ok(reusable)
    }

    /// Re-reads every referenced product and builds the authoritative cart:
    /// prices and shop assignments come from the catalog, not the client.
    async fn resolve_cart(&self, cart: &[CartLineInput]) -> Result<Vec<CartLine>, ServiceError> {
        let ids: Vec<Uuid> = cart
            .iter()
            .map(|line| line.product_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        cart.iter()
            .map(|line| {
                let product = products.get(&line.product_id).ok_or_else(|| {
                    ServiceError::InvalidCart(format!("product {} not found", line.product_id))
                })?;
                Ok(CartLine {
                    product_id: product.id,
                    shop_id: product.shop_id,
                    quantity: line.quantity,
                    unit_price: product.unit_price,
                    selected_options: line.selected_options.clone(),
                })
            })
            .collect()
    }

    /// One batch lookup of all shops referenced by the cart, yielding the
    /// seller/gateway-account routing map.
    async fn resolve_sellers(
        &self,
        cart: &[CartLine],
    ) -> Result<HashMap<Uuid, SellerAccount>, ServiceError> {
        let shop_ids: Vec<Uuid> = cart
            .iter()
            .map(|line| line.shop_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let expected = shop_ids.len();

        let shops = shop::Entity::find()
            .filter(shop::Column::Id.is_in(shop_ids))
            .all(&*self.db)
            .await?;

        if shops.len() != expected {
            return Err(ServiceError::InvalidCart(
                "cart references an unknown shop".into(),
            ));
        }

        shops
            .into_iter()
            .map(|s| {
                if s.gateway_account_id.is_empty() {
                    return Err(ServiceError::InvalidCart(format!(
                        "shop {} has no connected gateway account",
                        s.id
                    )));
                }
                Ok((
                    s.id,
                    SellerAccount {
                        seller_id: s.owner_id,
                        gateway_account_id: s.gateway_account_id,
                    },
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(product: Uuid, shop: Uuid, qty: i32, price: Decimal) -> CartLineInput {
        CartLineInput {
            product_id: product,
            shop_id: shop,
            quantity: qty,
            unit_price: price,
            selected_options: None,
        }
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let shop = Uuid::new_v4();

        let a = vec![
            line(p1, shop, 1, dec!(100)),
            line(p2, shop, 2, dec!(50)),
        ];
        let b = vec![
            line(p2, shop, 2, dec!(50)),
            line(p1, shop, 1, dec!(100)),
        ];

        assert_eq!(cart_fingerprint(&a), cart_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_quantity() {
        let p1 = Uuid::new_v4();
        let shop = Uuid::new_v4();

        let a = vec![line(p1, shop, 1, dec!(100))];
        let b = vec![line(p1, shop, 2, dec!(100))];

        assert_ne!(cart_fingerprint(&a), cart_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_selected_options() {
        let p1 = Uuid::new_v4();
        let shop = Uuid::new_v4();

        let mut a = vec![line(p1, shop, 1, dec!(100))];
        a[0].selected_options = Some(json!({"size": "M"}));
        let mut b = vec![line(p1, shop, 1, dec!(100))];
        b[0].selected_options = Some(json!({"size": "L"}));

        assert_ne!(cart_fingerprint(&a), cart_fingerprint(&b));
    }

    #[test]
    fn fingerprint_normalizes_price_scale() {
        let p1 = Uuid::new_v4();
        let shop = Uuid::new_v4();

        let a = vec![line(p1, shop, 1, dec!(100))];
        let b = vec![line(p1, shop, 1, dec!(100.00))];

        assert_eq!(cart_fingerprint(&a), cart_fingerprint(&b));
    }

    #[test]
    fn session_ids_are_prefixed_and_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert!(a.starts_with("cs_"));
        assert_eq!(a.len(), 3 + 24);
        assert_ne!(a, b);
    }

    #[test]
    fn coupon_variants_expose_code_and_target() {
        let product_id = Uuid::new_v4();
        let coupon = Coupon::Percent {
            code: "SAVE10".into(),
            product_id,
            percent: dec!(10),
        };
        assert_eq!(coupon.code(), "SAVE10");
        assert_eq!(coupon.product_id(), product_id);
    }

    #[test]
    fn coupon_serde_is_tagged() {
        let coupon = Coupon::Flat {
            code: "TENOFF".into(),
            product_id: Uuid::new_v4(),
            amount: dec!(10),
        };
        let value = serde_json::to_value(&coupon).unwrap();
        assert_eq!(value["kind"], "flat");
        let back: Coupon = serde_json::from_value(value).unwrap();
        assert!(matches!(back, Coupon::Flat { .. }));
    }
}

use crate::{
    entities::{product, product_analytics, user_analytics},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// A single entry of the per-user action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseAction {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseAction {
    pub fn purchase(product_id: Uuid, shop_id: Uuid) -> Self {
        Self {
            product_id,
            shop_id,
            action: "purchase".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Stock and analytics updates performed during order materialization. Every
/// operation takes an explicit connection so it can join the caller's
/// transaction, and each is usable on its own.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Handle for callers that want to run an operation outside a
    /// transaction.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Decrements stock and bumps the cumulative sales counter in one atomic
    /// conditional update. The `stock >= qty` guard means concurrent
    /// purchases of the last unit cannot drive stock negative; the loser gets
    /// `Oversell`.
    #[instrument(skip(self, conn))]
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish a vanished product from a genuine oversell
            let exists = product::Entity::find_by_id(product_id).one(conn).await?;
            return match exists {
                None => Err(ServiceError::NotFound(format!(
                    "Product {} not found",
                    product_id
                ))),
                Some(p) => {
                    warn!(
                        product_id = %product_id,
                        stock = p.stock,
                        requested = quantity,
                        "Stock decrement refused"
                    );
                    Err(ServiceError::Oversell(format!(
                        "product {} has {} in stock, {} requested",
                        product_id, p.stock, quantity
                    )))
                }
            };
        }

        Ok(())
    }

    /// Creates the per-product analytics row on first purchase, otherwise
    /// increments the purchase counter and refreshes the last-purchase
    /// timestamp.
    #[instrument(skip(self, conn))]
    pub async fn upsert_product_analytics<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        shop_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();

        match product_analytics::Entity::find_by_id(product_id)
            .one(conn)
            .await?
        {
            Some(existing) => {
                let current = existing.purchase_count;
                let mut model: product_analytics::ActiveModel = existing.into();
                model.purchase_count = Set(current + i64::from(quantity));
                model.last_purchased_at = Set(now);
                model.updated_at = Set(Some(now));
                model.update(conn).await?;
            }
            None => {
                let model = product_analytics::ActiveModel {
                    product_id: Set(product_id),
                    shop_id: Set(shop_id),
                    purchase_count: Set(i64::from(quantity)),
                    last_purchased_at: Set(now),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                model.insert(conn).await?;
            }
        }

        Ok(())
    }

    /// Appends a record to the user's action log, creating the row when the
    /// user has none yet.
    #[instrument(skip(self, conn, action))]
    pub async fn append_user_action<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        action: PurchaseAction,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let entry = serde_json::to_value(&action)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        match user_analytics::Entity::find_by_id(user_id).one(conn).await? {
            Some(existing) => {
                let mut actions = match existing.actions.clone() {
                    serde_json::Value::Array(items) => items,
                    other => {
                        // Malformed log; preserve whatever was there
                        warn!(user_id = %user_id, "User action log was not an array; rewrapping");
                        vec![other]
                    }
                };
                actions.push(entry);

                let mut model: user_analytics::ActiveModel = existing.into();
                model.actions = Set(serde_json::Value::Array(actions));
                model.updated_at = Set(Some(now));
                model.update(conn).await?;
            }
            None => {
                let model = user_analytics::ActiveModel {
                    user_id: Set(user_id),
                    actions: Set(json!([entry])),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                model.insert(conn).await?;
            }
        }

        Ok(())
    }
}

use crate::{
    config::AppConfig,
    entities::{cart, cart_item, Cart, CartItem, CartModel, CartStatus, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Cart store for one buyer.
///
/// Owns all cart mutations; totals are recomputed inside the same
/// transaction as the mutation so no intermediate state is observable.
/// The payment flow never mutates a cart — it works from [`CartSnapshot`]s.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// Cart plus its line items.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
}

/// Immutable copy of a cart taken at checkout time. Later cart mutations
/// never affect a snapshot that has already been handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub lines: Vec<SnapshotLine>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Totals for a set of cart lines. The delivery fee is flat and applies
/// only to non-empty carts.
pub fn compute_totals(lines: &[(i32, Decimal)], delivery_fee: Decimal) -> (Decimal, Decimal, Decimal) {
    let subtotal: Decimal = lines
        .iter()
        .map(|(quantity, unit_price)| *unit_price * Decimal::from(*quantity))
        .sum();
    let fee = if lines.is_empty() { Decimal::ZERO } else { delivery_fee };
    (subtotal, fee, subtotal + fee)
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Returns the buyer's active cart, creating one if necessary.
    #[instrument(skip(self))]
    pub async fn get_or_create_active_cart(&self, buyer_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::BuyerId.eq(buyer_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let cart_id = Uuid::new_v4();
        let new_cart = cart::ActiveModel {
            id: Set(cart_id),
            buyer_id: Set(buyer_id),
            status: Set(CartStatus::Active),
            subtotal: Set(Decimal::ZERO),
            delivery_fee: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = new_cart.insert(&*self.db).await?;
        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
        info!(%cart_id, %buyer_id, "created cart");
        Ok(created)
    }

    /// Adds a product to the cart, merging quantities when the line already
    /// exists. The catalog price is snapshotted onto the line at add time.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::validation(
                "quantity",
                "quantity must be at least 1",
            ));
        }

        let cart = self.get_or_create_active_cart(buyer_id).await?;
        let txn = self.db.begin().await?;

        let listing = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;
        if !listing.available {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {product_id} is not available"
            )));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let unit_price = item.unit_price;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.line_total = Set(unit_price * Decimal::from(new_quantity));
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let line_total = listing.unit_price * Decimal::from(quantity);
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    unit_price: Set(listing.unit_price),
                    line_total: Set(line_total),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
            }
        }

        let cart = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.with_items(cart).await
    }

    /// Sets the quantity of an existing line. Quantities below one are
    /// rejected rather than clamped or treated as removal.
    #[instrument(skip(self))]
    pub async fn set_item_quantity(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::validation(
                "quantity",
                "quantity must be at least 1",
            ));
        }

        let cart = self.get_or_create_active_cart(buyer_id).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {product_id} is not in the cart"))
            })?;

        let unit_price = item.unit_price;
        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.line_total = Set(unit_price * Decimal::from(quantity));
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        let cart = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                product_id,
            })
            .await;

        self.with_items(cart).await
    }

    /// Removes a line. Removing a product that is not in the cart is a
    /// no-op; removing the last line leaves an empty cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_active_cart(buyer_id).await?;
        let txn = self.db.begin().await?;

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;

        let cart = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        if deleted.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart.id,
                    product_id,
                })
                .await;
        }

        self.with_items(cart).await
    }

    /// Deletes every line and zeroes the totals.
    #[instrument(skip(self))]
    pub async fn clear(&self, buyer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_active_cart(buyer_id).await?;
        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let cart = self.recalculate_totals(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!(cart_id = %cart.id, "cleared cart");

        self.with_items(cart).await
    }

    /// Returns the buyer's active cart with its items.
    pub async fn get_cart(&self, buyer_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_or_create_active_cart(buyer_id).await?;
        self.with_items(cart).await
    }

    /// Takes an immutable snapshot of the active cart for checkout.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, buyer_id: Uuid) -> Result<CartSnapshot, ServiceError> {
        let CartWithItems { cart, items } = self.get_cart(buyer_id).await?;

        Ok(CartSnapshot {
            cart_id: cart.id,
            lines: items
                .iter()
                .map(|item| SnapshotLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
            subtotal: cart.subtotal,
            delivery_fee: cart.delivery_fee,
            total: cart.total,
        })
    }

    async fn with_items(&self, cart: CartModel) -> Result<CartWithItems, ServiceError> {
        let items = cart.find_related(CartItem).all(&*self.db).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Recomputes subtotal / delivery fee / total from the current lines.
    /// Must run on the same connection as the mutation it follows.
    async fn recalculate_totals(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let lines: Vec<(i32, Decimal)> =
            items.iter().map(|item| (item.quantity, item.unit_price)).collect();
        let (subtotal, fee, total) = compute_totals(&lines, self.config.delivery_fee);

        let mut active: cart::ActiveModel = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {cart_id} not found")))?
            .into();

        active.subtotal = Set(subtotal);
        active.delivery_fee = Set(fee);
        active.total = Set(total);
        active.updated_at = Set(Utc::now());

        Ok(active.update(conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_of_empty_cart_are_zero() {
        let (subtotal, fee, total) = compute_totals(&[], dec!(200));
        assert_eq!(subtotal, Decimal::ZERO);
        assert_eq!(fee, Decimal::ZERO);
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn totals_add_flat_delivery_fee_once() {
        let lines = vec![(2, dec!(100)), (1, dec!(50))];
        let (subtotal, fee, total) = compute_totals(&lines, dec!(200));
        assert_eq!(subtotal, dec!(250));
        assert_eq!(fee, dec!(200));
        assert_eq!(total, dec!(450));
    }

    #[test]
    fn two_units_at_100_with_fee_total_400() {
        // 2 x 100 with delivery fee 200 -> 400
        let (_, _, total) = compute_totals(&[(2, dec!(100))], dec!(200));
        assert_eq!(total, dec!(400));
    }

    #[test]
    fn totals_keep_decimal_precision() {
        let lines = vec![(3, dec!(19.99))];
        let (subtotal, _, total) = compute_totals(&lines, dec!(0.01));
        assert_eq!(subtotal, dec!(59.97));
        assert_eq!(total, dec!(59.98));
    }

    #[test]
    fn snapshot_reports_emptiness() {
        let snapshot = CartSnapshot {
            cart_id: Uuid::new_v4(),
            lines: vec![],
            subtotal: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            total: Decimal::ZERO,
        };
        assert!(snapshot.is_empty());
    }
}

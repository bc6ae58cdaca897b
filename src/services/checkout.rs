use crate::{
    auth::SessionContext,
    entities::{cart, order, order_item, product, Cart, OrderModel, OrderStatus, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::carts::{CartService, CartSnapshot},
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,14}$").expect("phone regex is valid"));

/// Checkout inputs supplied by the buyer when confirming an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub delivery_address: String,
    pub phone_number: String,
    pub notes: Option<String>,
}

/// Order builder: validates checkout inputs and converts a cart snapshot
/// into a persisted order.
///
/// The snapshot total is never trusted blindly: every line is re-priced
/// against the current catalog inside the checkout transaction, and any
/// disagreement aborts with [`ServiceError::PriceMismatch`] (price drift
/// between cart and catalog means the buyer must restart from a refreshed
/// cart).
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: Arc<CartService>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        carts: Arc<CartService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
        }
    }

    /// Confirms checkout: snapshot the cart, validate inputs, create the
    /// order in `pending` and mark the cart converted. The order is
    /// immutable once created; later cart edits do not touch it.
    #[instrument(skip(self, input))]
    pub async fn submit(
        &self,
        session: SessionContext,
        input: CheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        validate_input(&input)?;

        let snapshot = self.carts.snapshot(session.user_id).await?;
        if snapshot.is_empty() {
            return Err(ServiceError::validation("cart", "cart is empty"));
        }

        let txn = self.db.begin().await?;

        // Hold the cart in `converting` for the duration of the
        // transaction; a rollback restores `active`.
        let cart_model = Cart::find_by_id(snapshot.cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", snapshot.cart_id)))?;
        let mut converting: cart::ActiveModel = cart_model.into();
        converting.status = Set(cart::CartStatus::Converting);
        converting.updated_at = Set(Utc::now());
        let cart_model = converting.update(&txn).await?;

        // Re-price the snapshot against the current catalog and reserve
        // stock. The snapshot total and the independently computed catalog
        // total must agree; any short line aborts the whole checkout.
        let mut confirmed_subtotal = Decimal::ZERO;
        let mut catalog_names: Vec<(Uuid, String)> = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            let listing = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} no longer exists", line.product_id))
                })?;
            if !listing.available {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {} is no longer available",
                    line.product_id
                )));
            }
            if listing.stock < line.quantity {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {} has only {} of {} units in stock",
                    line.product_id, listing.stock, line.quantity
                )));
            }
            confirmed_subtotal += listing.unit_price * Decimal::from(line.quantity);
            catalog_names.push((listing.id, listing.name.clone()));

            let remaining = listing.stock - line.quantity;
            let mut reserved: product::ActiveModel = listing.into();
            reserved.stock = Set(remaining);
            reserved.updated_at = Set(Utc::now());
            reserved.update(&txn).await?;
        }

        let confirmed_total = confirmed_subtotal + snapshot.delivery_fee;
        if confirmed_total != snapshot.total {
            warn!(
                cart_id = %snapshot.cart_id,
                expected = %snapshot.total,
                confirmed = %confirmed_total,
                "price drift between cart snapshot and catalog"
            );
            return Err(ServiceError::PriceMismatch {
                expected: snapshot.total,
                confirmed: confirmed_total,
            });
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let new_order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number(order_id)),
            buyer_id: Set(session.user_id),
            status: Set(OrderStatus::Pending),
            delivery_address: Set(input.delivery_address.trim().to_string()),
            phone_number: Set(input.phone_number.trim().to_string()),
            notes: Set(input.notes.filter(|n| !n.trim().is_empty())),
            subtotal: Set(snapshot.subtotal),
            delivery_fee: Set(snapshot.delivery_fee),
            total_amount: Set(snapshot.total),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let created = new_order.insert(&txn).await?;

        for line in &snapshot.lines {
            let product_name = catalog_names
                .iter()
                .find(|(id, _)| *id == line.product_id)
                .map(|(_, name)| name.clone())
                .unwrap_or_default();

            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(product_name),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let mut converted: cart::ActiveModel = cart_model.into();
        converted.status = Set(cart::CartStatus::Converted);
        converted.updated_at = Set(Utc::now());
        converted.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id: snapshot.cart_id,
                order_id,
            })
            .await;
        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        info!(
            %order_id,
            cart_id = %snapshot.cart_id,
            total = %created.total_amount,
            "order created from cart"
        );
        Ok(created)
    }
}

fn validate_input(input: &CheckoutInput) -> Result<(), ServiceError> {
    if input.delivery_address.trim().is_empty() {
        return Err(ServiceError::validation(
            "delivery_address",
            "delivery address must not be empty",
        ));
    }
    let phone = input.phone_number.trim();
    if phone.is_empty() {
        return Err(ServiceError::validation(
            "phone_number",
            "phone number must not be empty",
        ));
    }
    if !PHONE_RE.is_match(phone) {
        return Err(ServiceError::validation(
            "phone_number",
            "phone number is not a valid phone number",
        ));
    }
    Ok(())
}

fn order_number(order_id: Uuid) -> String {
    format!("FD-{}", order_id.simple().to_string()[..8].to_uppercase())
}

/// Used by tests to build inputs without going through HTTP.
impl CheckoutInput {
    pub fn new(delivery_address: &str, phone_number: &str, notes: Option<&str>) -> Self {
        Self {
            delivery_address: delivery_address.to_string(),
            phone_number: phone_number.to_string(),
            notes: notes.map(str::to_string),
        }
    }
}

use crate::{
    auth::SessionContext,
    entities::{
        order, order_item, payment_attempt, Order, OrderItem, OrderItemModel, OrderModel,
        PaymentAttempt, PaymentAttemptModel,
    },
    errors::ServiceError,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Read side of orders: buyers see their own order history and details.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

/// An order with its immutable line items and payment attempt history.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub payment_attempts: Vec<PaymentAttemptModel>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_order(
        &self,
        session: SessionContext,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let found = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if found.buyer_id != session.user_id {
            return Err(ServiceError::Forbidden(
                "order belongs to another account".to_string(),
            ));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let payment_attempts = PaymentAttempt::find()
            .filter(payment_attempt::Column::OrderId.eq(order_id))
            .order_by_asc(payment_attempt::Column::InitiatedAt)
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order: found,
            items,
            payment_attempts,
        })
    }

    /// Lists the caller's orders, newest first.
    pub async fn list_orders(
        &self,
        session: SessionContext,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::BuyerId.eq(session.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }
}

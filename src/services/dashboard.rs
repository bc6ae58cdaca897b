use crate::{
    auth::SessionContext,
    entities::{
        order, order_item, product, Order, OrderItem, OrderModel, OrderStatus, Product,
        ProductModel,
    },
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const RECENT_ORDERS: u64 = 10;

/// Role-specific home view assembled from order and catalog data.
#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum DashboardView {
    Buyer(BuyerDashboard),
    Farmer(FarmerDashboard),
}

#[derive(Debug, Serialize)]
pub struct BuyerDashboard {
    pub recent_orders: Vec<OrderModel>,
    pub paid_order_count: u64,
    pub total_spent: Decimal,
}

#[derive(Debug, Serialize)]
pub struct FarmerDashboard {
    pub listings: Vec<ListingStats>,
}

/// A farmer's listing with sales figures from paid orders only.
#[derive(Debug, Serialize)]
pub struct ListingStats {
    #[serde(flatten)]
    pub listing: ProductModel,
    pub units_sold: i64,
    pub revenue: Decimal,
}

impl DashboardService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn view_for(&self, session: SessionContext) -> Result<DashboardView, ServiceError> {
        if session.is_farmer() {
            Ok(DashboardView::Farmer(self.farmer_view(session).await?))
        } else {
            Ok(DashboardView::Buyer(self.buyer_view(session).await?))
        }
    }

    async fn buyer_view(&self, session: SessionContext) -> Result<BuyerDashboard, ServiceError> {
        let recent_orders = Order::find()
            .filter(order::Column::BuyerId.eq(session.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .limit(RECENT_ORDERS)
            .all(&*self.db)
            .await?;

        let paid = Order::find()
            .filter(order::Column::BuyerId.eq(session.user_id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .all(&*self.db)
            .await?;

        let paid_order_count = paid.len() as u64;
        let total_spent = paid.iter().map(|o| o.total_amount).sum();

        Ok(BuyerDashboard {
            recent_orders,
            paid_order_count,
            total_spent,
        })
    }

    /// Sales figures only count orders that reached `paid`; pending and
    /// failed orders contribute nothing.
    async fn farmer_view(&self, session: SessionContext) -> Result<FarmerDashboard, ServiceError> {
        let listings = Product::find()
            .filter(product::Column::FarmerId.eq(session.user_id))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if listings.is_empty() {
            return Ok(FarmerDashboard { listings: vec![] });
        }

        let listing_ids: Vec<_> = listings.iter().map(|l| l.id).collect();
        let sold_lines: Vec<(order_item::Model, Option<OrderModel>)> = OrderItem::find()
            .filter(order_item::Column::ProductId.is_in(listing_ids))
            .find_also_related(Order)
            .all(&*self.db)
            .await?;

        let mut units: HashMap<uuid::Uuid, i64> = HashMap::new();
        let mut revenue: HashMap<uuid::Uuid, Decimal> = HashMap::new();
        for (line, parent) in sold_lines {
            let Some(parent) = parent else { continue };
            if parent.status != OrderStatus::Paid {
                continue;
            }
            *units.entry(line.product_id).or_default() += i64::from(line.quantity);
            *revenue.entry(line.product_id).or_default() += line.line_total;
        }

        let listings = listings
            .into_iter()
            .map(|listing| ListingStats {
                units_sold: units.get(&listing.id).copied().unwrap_or_default(),
                revenue: revenue.get(&listing.id).copied().unwrap_or_default(),
                listing,
            })
            .collect();

        Ok(FarmerDashboard { listings })
    }
}

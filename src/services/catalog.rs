use crate::{
    auth::SessionContext,
    entities::{product, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Produce catalog: farmers create listings, buyers browse them.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for creating a listing.
#[derive(Debug, Deserialize)]
pub struct CreateListingInput {
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub unit_price: Decimal,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub stock: i32,
}

fn default_available() -> bool {
    true
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a produce listing owned by the calling farmer.
    #[instrument(skip(self, input))]
    pub async fn create_listing(
        &self,
        session: SessionContext,
        input: CreateListingInput,
    ) -> Result<ProductModel, ServiceError> {
        if !session.is_farmer() {
            return Err(ServiceError::Forbidden(
                "only farmers can create listings".to_string(),
            ));
        }
        if input.name.trim().is_empty() {
            return Err(ServiceError::validation("name", "name must not be empty"));
        }
        if input.unit_price <= Decimal::ZERO {
            return Err(ServiceError::validation(
                "unit_price",
                "unit price must be positive",
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::validation(
                "stock",
                "stock must not be negative",
            ));
        }

        let now = Utc::now();
        let listing = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            farmer_id: Set(session.user_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            unit: Set(input.unit),
            unit_price: Set(input.unit_price),
            available: Set(input.available),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = listing.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        info!(product_id = %created.id, farmer_id = %session.user_id, "created listing");
        Ok(created)
    }

    /// Lists available produce, newest first.
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let paginator = Product::find()
            .filter(product::Column::Available.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }
}

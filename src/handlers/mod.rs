pub mod auth;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod orders;
pub mod payments;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use crate::AppState;

/// Page selector for list endpoints. Out-of-range values are clamped
/// rather than rejected: page 0 reads as the first page and `per_page`
/// is capped at 100.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListQuery {
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }
}

/// Flat page envelope returned by list endpoints.
#[derive(Debug, Serialize)]
pub struct Listed<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> Listed<T> {
    pub fn new(query: ListQuery, data: Vec<T>, total: u64) -> Self {
        Self {
            data,
            page: query.page,
            per_page: query.per_page,
            total,
        }
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<crate::services::users::UserService>,
    pub catalog: Arc<crate::services::catalog::CatalogService>,
    pub carts: Arc<crate::services::carts::CartService>,
    pub checkout: Arc<crate::services::checkout::CheckoutService>,
    pub orders: Arc<crate::services::orders::OrderService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
    pub dashboard: Arc<crate::services::dashboard::DashboardService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let users = Arc::new(crate::services::users::UserService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let catalog = Arc::new(crate::services::catalog::CatalogService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let carts = Arc::new(crate::services::carts::CartService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let checkout = Arc::new(crate::services::checkout::CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            carts.clone(),
        ));
        let orders = Arc::new(crate::services::orders::OrderService::new(db.clone()));
        let payments = Arc::new(crate::services::payments::PaymentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            config,
        ));
        let dashboard = Arc::new(crate::services::dashboard::DashboardService::new(db));

        Self {
            users,
            catalog,
            carts,
            checkout,
            orders,
            payments,
            dashboard,
        }
    }
}

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    errors::ServiceError,
    handlers::{ListQuery, Listed},
    AppState,
};

async fn list_orders(
    State(state): State<AppState>,
    session: SessionContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let query = query.clamped();
    let (data, total) = state
        .services
        .orders
        .list_orders(session, query.page, query.per_page)
        .await?;
    Ok(Json(Listed::new(query, data, total)))
}

async fn get_order(
    State(state): State<AppState>,
    session: SessionContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.services.orders.get_order(session, order_id).await?;
    Ok(Json(detail))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
}

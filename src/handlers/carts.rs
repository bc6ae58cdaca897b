use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{auth::SessionContext, errors::ServiceError, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

async fn get_cart(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(session.user_id).await?;
    Ok(Json(cart))
}

async fn add_item(
    State(state): State<AppState>,
    session: SessionContext,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .add_item(session.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(cart))
}

async fn set_item_quantity(
    State(state): State<AppState>,
    session: SessionContext,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .set_item_quantity(session.user_id, product_id, payload.quantity)
        .await?;
    Ok(Json(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    session: SessionContext,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .remove_item(session.user_id, product_id)
        .await?;
    Ok(Json(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.clear(session.user_id).await?;
    Ok(Json(cart))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:product_id", delete(remove_item).put(set_item_quantity))
}

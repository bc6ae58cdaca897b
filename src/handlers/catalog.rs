use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    errors::ServiceError,
    handlers::{ListQuery, Listed},
    services::catalog::CreateListingInput,
    AppState,
};

async fn create_listing(
    State(state): State<AppState>,
    session: SessionContext,
    Json(payload): Json<CreateListingInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let listing = state
        .services
        .catalog
        .create_listing(session, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let query = query.clamped();
    let (data, total) = state
        .services
        .catalog
        .list_products(query.page, query.per_page)
        .await?;
    Ok(Json(Listed::new(query, data, total)))
}

async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let listing = state.services.catalog.get_product(product_id).await?;
    Ok(Json(listing))
}

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_listing))
        .route("/:id", get(get_product))
}

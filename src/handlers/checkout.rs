use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::{
    auth::SessionContext, errors::ServiceError, services::checkout::CheckoutInput, AppState,
};

async fn submit_checkout(
    State(state): State<AppState>,
    session: SessionContext,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.checkout.submit(session, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(submit_checkout))
}

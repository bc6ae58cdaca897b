use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::{auth::SessionContext, errors::ServiceError, AppState};

async fn get_dashboard(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.dashboard.view_for(session).await?;
    Ok(Json(view))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/", get(get_dashboard))
}

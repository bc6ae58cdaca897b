use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::{AccountRole, UserModel},
    errors::ServiceError,
    services::users::RegisterInput,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    #[schema(value_type = String)]
    pub role: AccountRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    #[schema(value_type = Object)]
    pub user: UserModel,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let account = state
        .services
        .users
        .register(RegisterInput {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            password: payload.password,
            role: payload.role,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: account.token,
            user: account.user,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let account = state
        .services
        .users
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(AuthResponse {
        token: account.token,
        user: account.user,
    }))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

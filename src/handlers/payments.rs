use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    entities::OrderStatus,
    errors::ServiceError,
    gateway,
    AppState,
};

const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub order_id: Uuid,
    #[schema(value_type = String)]
    pub status: OrderStatus,
}

/// Query parameters the gateway appends to the client redirect.
#[derive(Debug, Deserialize)]
pub struct ReturnParams {
    pub order_id: Uuid,
    pub reference: String,
}

/// Body of a signed gateway webhook.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookPayload {
    pub order_id: Uuid,
    pub reference: String,
}

async fn initiate_payment(
    State(state): State<AppState>,
    session: SessionContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let initiated = state
        .services
        .payments
        .initiate_payment(session, order_id)
        .await?;
    Ok(Json(initiated))
}

/// Landing endpoint for the buyer's redirect back from the gateway. The
/// redirect itself proves nothing; the order status in the response is the
/// outcome of server-side verification.
async fn payment_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .payments
        .handle_client_return(params.order_id, &params.reference)
        .await?;
    Ok(Json(PaymentStatusResponse {
        order_id: params.order_id,
        status,
    }))
}

/// Signed gateway webhook. The HMAC is computed over the raw body, so the
/// body must be verified before any JSON parsing.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::AuthError("missing webhook signature".to_string()))?;

    if let Err(err) = gateway::verify_webhook_signature(&state.config.gateway_secret, &body, signature)
    {
        warn!("webhook signature verification failed");
        return Err(err);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::validation("body", format!("invalid webhook body: {e}")))?;

    let status = state
        .services
        .payments
        .handle_gateway_callback(payload.order_id, &payload.reference)
        .await?;
    Ok(Json(PaymentStatusResponse {
        order_id: payload.order_id,
        status,
    }))
}

async fn cancel_order(
    State(state): State<AppState>,
    session: SessionContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .payments
        .cancel_order(session, order_id)
        .await?;
    Ok(Json(order))
}

/// Routes mounted under `/payments`.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/return", get(payment_return))
        .route("/webhook", post(payment_webhook))
}

/// Payment actions on a specific order, mounted under `/orders`.
pub fn order_payment_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/pay", post(initiate_payment))
        .route("/:id/cancel", post(cancel_order))
}

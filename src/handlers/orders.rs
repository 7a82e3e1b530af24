use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::identity::{AdminIdentity, Identity};
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/advance", post(advance_order))
}

#[derive(Debug, Deserialize)]
struct AdvanceRequest {
    target: String,
}

fn parse_fulfilment_target(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.to_ascii_lowercase().as_str() {
        "delivery" => Ok(OrderStatus::Delivery),
        "finished" => Ok(OrderStatus::Finished),
        other => Err(ServiceError::ValidationError(format!(
            "unknown fulfilment target: {other}"
        ))),
    }
}

async fn list_orders(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_for_user(identity.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

async fn get_order(
    State(state): State<AppState>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get(order_id, Some(identity.user_id))
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn advance_order(
    State(state): State<AppState>,
    AdminIdentity(_): AdminIdentity,
    Path(order_id): Path<Uuid>,
    Json(body): Json<AdvanceRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let target = parse_fulfilment_target(&body.target)?;
    let order = state.services.orders.advance_status(order_id, target).await?;
    Ok(Json(ApiResponse::success(order)))
}

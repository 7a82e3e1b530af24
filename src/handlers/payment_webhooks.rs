use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::info;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::payments::NotificationPayload;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notification", post(handle_notification))
        .route("/mock/confirm/:external_order_id", post(mock_confirm))
}

/// Gateway-facing webhook. Anything with a valid signature is answered
/// with 200 so the gateway stops retrying, even when the referenced order
/// is unknown or already settled.
async fn handle_notification(
    State(state): State<AppState>,
    Json(payload): Json<NotificationPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.process_notification(&payload).await?;
    Ok(Json(ApiResponse::<()>::message("Notification processed")))
}

/// Development helper that settles an order the way a real notification
/// would. Only exists while the mock gateway is active.
async fn mock_confirm(
    State(state): State<AppState>,
    Path(external_order_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    if !state.gateway.auto_confirms() {
        return Err(ServiceError::NotFound(
            "mock confirmation is not available".into(),
        ));
    }

    let updated = state
        .services
        .orders
        .apply_payment_notification(&external_order_id, OrderStatus::Processed, "mock_payment")
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {external_order_id} not found")))?;

    info!(%external_order_id, "order confirmed via mock endpoint");
    Ok(Json(ApiResponse::success(updated)))
}

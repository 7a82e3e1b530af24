use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::identity::Identity;
use crate::services::cart::AddCartItemInput;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_item).delete(remove_item))
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

async fn get_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.cart.list(identity.user_id).await?;
    Ok(Json(ApiResponse::success(lines)))
}

async fn add_item(
    State(state): State<AppState>,
    identity: Identity,
    Json(input): Json<AddCartItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.cart.add_item(identity.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

async fn update_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .cart
        .update_item(identity.user_id, item_id, body.quantity)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

async fn remove_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .cart
        .remove_item(identity.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::<()>::message("Cart item removed")))
}

async fn clear_cart(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.cart.clear_for_user(identity.user_id).await?;
    Ok(Json(ApiResponse::<()>::message("Cart cleared")))
}

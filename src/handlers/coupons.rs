use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::coupons::CreateCouponInput;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/:id", get(get_coupon).delete(delete_coupon))
        .route("/:id/deactivate", post(deactivate_coupon))
}

async fn list_coupons(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let coupons = state.services.coupons.list().await?;
    Ok(Json(ApiResponse::success(coupons)))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(input): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.create(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(coupon))))
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.get(id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.deactivate(id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupons.remove(id).await?;
    Ok(Json(ApiResponse::<()>::message("Coupon deleted")))
}

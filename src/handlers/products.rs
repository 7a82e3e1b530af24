use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::identity::Identity;
use crate::services::catalog::{CreateProductInput, ListProductsQuery, UpdateProductInput};
use crate::services::ratings::RateProductInput;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product))
        .route(
            "/:id/ratings",
            get(list_ratings).put(rate_product).delete(delete_rating),
        )
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.services.catalog.list(query).await?;
    Ok(Json(ApiResponse::success(page)))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.create(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.update(id, input).await?;
    Ok(Json(ApiResponse::success(product)))
}

async fn list_ratings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ratings = state.services.ratings.list_for_product(id).await?;
    Ok(Json(ApiResponse::success(ratings)))
}

async fn rate_product(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(input): Json<RateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let rating = state
        .services
        .ratings
        .rate(id, identity.user_id, input)
        .await?;
    Ok(Json(ApiResponse::success(rating)))
}

async fn delete_rating(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .ratings
        .delete_own(id, identity.user_id)
        .await?;
    Ok(Json(ApiResponse::<()>::message("Rating removed")))
}

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;

use crate::errors::ServiceError;
use crate::handlers::identity::Identity;
use crate::services::checkout::CheckoutInput;
use crate::{ApiResponse, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutRequest {
    coupon_code: Option<String>,
}

async fn checkout(
    State(state): State<AppState>,
    identity: Identity,
    body: Option<Json<CheckoutRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let coupon_code = request
        .coupon_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    let outcome = state
        .services
        .checkout
        .checkout(CheckoutInput {
            user_id: identity.user_id,
            user_email: identity.email,
            user_name: identity.name,
            coupon_code,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

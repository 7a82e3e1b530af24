use axum::Router;
use std::sync::Arc;

use crate::services::{
    cart::CartService, catalog::ProductCatalogService, checkout::CheckoutService,
    coupons::CouponService, orders::OrderService, ratings::RatingService,
};
use crate::AppState;

pub mod carts;
pub mod categories;
pub mod checkout;
pub mod coupons;
pub mod health;
pub mod identity;
pub mod orders;
pub mod payment_webhooks;
pub mod products;

/// Every service the HTTP layer reaches for, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: ProductCatalogService,
    pub cart: CartService,
    pub coupons: CouponService,
    pub checkout: CheckoutService,
    pub orders: Arc<OrderService>,
    pub ratings: RatingService,
}

pub fn routes(state: AppState) -> Router {
    let api = Router::new()
        .nest("/products", products::router())
        .nest("/categories", categories::router())
        .nest("/cart", carts::router())
        .nest("/checkout", checkout::router())
        .nest("/orders", orders::router())
        .nest("/coupons", coupons::router())
        .nest("/payments", payment_webhooks::router());

    Router::new()
        .merge(health::router())
        .nest("/api/v1", api)
        .with_state(state)
}

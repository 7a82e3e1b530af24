use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payments;
pub mod services;

use events::EventSender;
use handlers::AppServices;
use payments::PaymentGateway;
use services::{
    cart::CartService, catalog::ProductCatalogService, checkout::CheckoutService,
    coupons::CouponService, inventory::InventoryService, orders::OrderService,
    ratings::RatingService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
    pub gateway: Arc<dyn PaymentGateway>,
}

/// Wires every service against one connection pool and gateway.
pub fn build_services(
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
) -> AppServices {
    let inventory = InventoryService::new();
    let coupons = CouponService::new(db.clone());
    let orders = Arc::new(OrderService::new(
        db.clone(),
        event_sender.clone(),
        inventory.clone(),
        gateway.clone(),
    ));
    let checkout = CheckoutService::new(
        db.clone(),
        event_sender.clone(),
        inventory,
        coupons.clone(),
        orders.clone(),
        gateway,
    );

    AppServices {
        catalog: ProductCatalogService::new(db.clone(), event_sender.clone()),
        ratings: RatingService::new(db.clone(), event_sender.clone()),
        cart: CartService::new(db, event_sender),
        coupons,
        checkout,
        orders,
    }
}

/// Uniform success envelope for HTTP responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

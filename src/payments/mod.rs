//! Payment gateway adapter.
//!
//! The checkout and order services are written against [`PaymentGateway`];
//! which implementation backs it is decided once at startup from
//! configuration and passed around as `Arc<dyn PaymentGateway>`.

pub mod midtrans;
pub mod mock;

pub use midtrans::MidtransGateway;
pub use mock::MockGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

/// One line item sent to the gateway's hosted payment page. Prices are
/// rounded to whole currency units; the coupon discount appears as a
/// synthetic negative line.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

/// Customer identity forwarded to the hosted payment page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCustomer {
    pub first_name: String,
    pub email: String,
}

/// Request for a hosted-payment session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub external_order_id: String,
    pub gross_amount: Decimal,
    pub items: Vec<SessionLineItem>,
    pub customer: SessionCustomer,
}

/// Token and redirect URL of a created payment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: String,
}

/// Inbound payment notification payload, as delivered by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    pub payment_type: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted-payment session for the given order total and items.
    async fn create_session(&self, request: SessionRequest)
        -> Result<PaymentSession, ServiceError>;

    /// Verifies the authenticity digest of an inbound notification.
    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool;

    /// Whether payments complete synchronously without a real gateway
    /// round-trip. True only for the mock implementation.
    fn auto_confirms(&self) -> bool {
        false
    }
}

/// Builds the gateway selected by configuration.
pub fn gateway_from_config(cfg: &GatewayConfig) -> std::sync::Arc<dyn PaymentGateway> {
    if cfg.mock {
        tracing::warn!("payment gateway running in mock mode; no real payments will be created");
        std::sync::Arc::new(mock::MockGateway::default())
    } else {
        std::sync::Arc::new(midtrans::MidtransGateway::new(cfg.clone()))
    }
}

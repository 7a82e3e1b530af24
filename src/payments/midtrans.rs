use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha512};
use tracing::{error, info, instrument};

use super::{PaymentGateway, PaymentSession, SessionRequest};
use crate::config::GatewayConfig;
use crate::errors::ServiceError;

const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_BASE_URL: &str = "https://app.midtrans.com";

/// Midtrans item names are capped at 50 characters.
const MAX_ITEM_NAME_LEN: usize = 50;

/// Snap API client for the Midtrans payment gateway.
pub struct MidtransGateway {
    client: reqwest::Client,
    server_key: String,
    base_url: String,
    session_expiry_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

impl MidtransGateway {
    pub fn new(cfg: GatewayConfig) -> Self {
        let base_url = if cfg.is_production {
            PRODUCTION_BASE_URL
        } else {
            SANDBOX_BASE_URL
        };

        Self {
            client: reqwest::Client::new(),
            server_key: cfg.server_key,
            base_url: base_url.to_string(),
            session_expiry_minutes: cfg.session_expiry_minutes,
        }
    }

    fn auth_header(&self) -> String {
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.server_key));
        format!("Basic {credentials}")
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    #[instrument(skip(self, request), fields(order_id = %request.external_order_id))]
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        let body = json!({
            "transaction_details": {
                "order_id": request.external_order_id,
                "gross_amount": request.gross_amount,
            },
            "item_details": request.items.iter().map(|item| {
                json!({
                    "id": item.id,
                    "name": item.name.chars().take(MAX_ITEM_NAME_LEN).collect::<String>(),
                    "price": item.price,
                    "quantity": item.quantity,
                })
            }).collect::<Vec<_>>(),
            "customer_details": {
                "first_name": request.customer.first_name,
                "email": request.customer.email,
            },
            "expiry": {
                "unit": "minutes",
                "duration": self.session_expiry_minutes,
            },
        });

        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("snap request failed: {e}");
                ServiceError::PaymentGatewayError(format!("snap request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(%status, "snap returned an error: {detail}");
            return Err(ServiceError::PaymentGatewayError(format!(
                "snap returned {status}"
            )));
        }

        let snap: SnapResponse = response.json().await.map_err(|e| {
            ServiceError::PaymentGatewayError(format!("invalid snap response: {e}"))
        })?;

        info!("snap token created");
        Ok(PaymentSession {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool {
        let digest = signature_digest(order_id, status_code, gross_amount, &self.server_key);
        constant_time_eq(&digest, signature_key)
    }
}

/// SHA-512 over `order_id + status_code + gross_amount + server_key`,
/// hex-encoded, per the gateway's notification scheme.
fn signature_digest(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_digest() {
        // Digest of "ORDER-1" + "200" + "30000.00" + "secret" must verify.
        let expected = signature_digest("ORDER-1", "200", "30000.00", "secret");

        let gateway = MidtransGateway::new(GatewayConfig {
            mock: false,
            server_key: "secret".into(),
            is_production: false,
            session_expiry_minutes: 30,
        });

        assert!(gateway.verify_signature("ORDER-1", "200", "30000.00", &expected));
        assert!(!gateway.verify_signature("ORDER-1", "200", "30000.01", &expected));
        assert!(!gateway.verify_signature("ORDER-1", "200", "30000.00", "deadbeef"));
    }

    #[test]
    fn production_flag_selects_base_url() {
        let sandbox = MidtransGateway::new(GatewayConfig::default());
        assert_eq!(sandbox.base_url, SANDBOX_BASE_URL);

        let prod = MidtransGateway::new(GatewayConfig {
            mock: false,
            server_key: "k".into(),
            is_production: true,
            session_expiry_minutes: 30,
        });
        assert_eq!(prod.base_url, PRODUCTION_BASE_URL);
    }
}

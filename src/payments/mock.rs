use async_trait::async_trait;
use tracing::info;

use super::{PaymentGateway, PaymentSession, SessionRequest};
use crate::errors::ServiceError;

/// Gateway stand-in for environments without payment credentials.
///
/// Returns deterministic fabricated tokens and URLs, accepts every
/// signature, and reports `auto_confirms` so checkout immediately applies a
/// successful-payment transition after commit.
#[derive(Debug, Default)]
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        info!(order_id = %request.external_order_id, "[mock] payment session created");
        Ok(PaymentSession {
            token: format!("mock-snap-token-{}", request.external_order_id),
            redirect_url: format!(
                "http://localhost:3000/mock-payment/{}",
                request.external_order_id
            ),
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        _status_code: &str,
        _gross_amount: &str,
        _signature_key: &str,
    ) -> bool {
        info!(%order_id, "[mock] signature verification bypassed");
        true
    }

    fn auto_confirms(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::SessionCustomer;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn session_tokens_are_deterministic() {
        let gateway = MockGateway;
        let request = SessionRequest {
            external_order_id: "TXN-abc".into(),
            gross_amount: dec!(30000),
            items: vec![],
            customer: SessionCustomer {
                first_name: "Budi".into(),
                email: "budi@example.com".into(),
            },
        };

        let session = gateway.create_session(request).await.unwrap();
        assert_eq!(session.token, "mock-snap-token-TXN-abc");
        assert_eq!(
            session.redirect_url,
            "http://localhost:3000/mock-payment/TXN-abc"
        );
        assert!(gateway.verify_signature("TXN-abc", "200", "30000", "anything"));
        assert!(gateway.auto_confirms());
    }
}

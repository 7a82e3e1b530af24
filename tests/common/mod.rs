#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, Response, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use toko_amplop_api::{
    build_services,
    config::AppConfig,
    db,
    entities::{
        coupon::{self, CouponType},
        order::{self, Entity as Order},
        order_item::{self, Entity as OrderItem},
        product_variant::{self, Entity as ProductVariant},
        CouponModel, OrderModel, ProductVariantModel,
    },
    errors::ServiceError,
    events::EventSender,
    handlers::{
        self,
        identity::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER},
        AppServices,
    },
    payments::{
        MockGateway, NotificationPayload, PaymentGateway, PaymentSession, SessionRequest,
    },
    services::{cart::AddCartItemInput, catalog::CreateProductInput, catalog::CreateVariantInput},
    AppState,
};

/// Gateway double that issues deterministic sessions but never settles on
/// its own, so orders stay in `waiting_payment` until a notification lands.
#[derive(Debug, Clone, Default)]
pub struct ManualGateway;

#[async_trait]
impl PaymentGateway for ManualGateway {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Ok(PaymentSession {
            token: format!("manual-token-{}", request.external_order_id),
            redirect_url: format!(
                "http://localhost:3000/manual-payment/{}",
                request.external_order_id
            ),
        })
    }

    fn verify_signature(
        &self,
        _order_id: &str,
        _status_code: &str,
        _gross_amount: &str,
        _signature_key: &str,
    ) -> bool {
        true
    }
}

/// Gateway double whose session creation always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn create_session(
        &self,
        _request: SessionRequest,
    ) -> Result<PaymentSession, ServiceError> {
        Err(ServiceError::PaymentGatewayError(
            "session creation refused".into(),
        ))
    }

    fn verify_signature(
        &self,
        _order_id: &str,
        _status_code: &str,
        _gross_amount: &str,
        _signature_key: &str,
    ) -> bool {
        true
    }
}

pub struct TestApp {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub services: AppServices,
    pub state: AppState,
    router: Router,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// App backed by a fresh in-memory SQLite database and a gateway that
    /// leaves orders waiting for payment.
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(ManualGateway)).await
    }

    /// App whose gateway auto-confirms every checkout, like the built-in mock.
    pub async fn auto_confirming() -> Self {
        Self::with_gateway(Arc::new(MockGateway)).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // One pooled connection so every query sees the same in-memory db.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");
        let pool = Arc::new(pool);

        let (tx, rx) = mpsc::channel(100);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(toko_amplop_api::events::process_events(rx));

        let services = build_services(pool.clone(), event_sender.clone(), gateway.clone());
        let state = AppState {
            db: pool.clone(),
            config: cfg,
            event_sender,
            services: services.clone(),
            gateway,
        };
        let router = handlers::routes(state.clone());

        Self {
            db: pool,
            services,
            state,
            router,
            _event_task: event_task,
        }
    }

    // ---- seeding -----------------------------------------------------

    pub async fn seed_product(
        &self,
        name: &str,
        variants: &[(&str, Decimal, i32)],
    ) -> Vec<ProductVariantModel> {
        let created = self
            .services
            .catalog
            .create(CreateProductInput {
                name: name.to_string(),
                description: None,
                image_url: None,
                category_id: None,
                variants: variants
                    .iter()
                    .map(|(vname, price, stock)| CreateVariantInput {
                        name: vname.to_string(),
                        price: *price,
                        stock: *stock,
                    })
                    .collect(),
            })
            .await
            .expect("failed to seed product");
        created.variants
    }

    pub async fn seed_coupon(&self, code: &str, r#type: CouponType, value: Decimal) -> CouponModel {
        self.seed_coupon_with(code, r#type, value, Decimal::ZERO, 0)
            .await
    }

    pub async fn seed_coupon_with(
        &self,
        code: &str,
        r#type: CouponType,
        value: Decimal,
        min_order: Decimal,
        usage_limit: i32,
    ) -> CouponModel {
        self.services
            .coupons
            .create(toko_amplop_api::services::coupons::CreateCouponInput {
                code: code.to_string(),
                r#type,
                value,
                min_order,
                valid_from: Utc::now() - Duration::hours(1),
                valid_to: Utc::now() + Duration::days(30),
                usage_limit,
            })
            .await
            .expect("failed to seed coupon")
    }

    pub async fn seed_expired_coupon(&self, code: &str, value: Decimal) -> CouponModel {
        self.services
            .coupons
            .create(toko_amplop_api::services::coupons::CreateCouponInput {
                code: code.to_string(),
                r#type: CouponType::Percentage,
                value,
                min_order: Decimal::ZERO,
                valid_from: Utc::now() - Duration::days(30),
                valid_to: Utc::now() - Duration::days(1),
                usage_limit: 0,
            })
            .await
            .expect("failed to seed coupon")
    }

    pub async fn add_to_cart(&self, user_id: Uuid, variant_id: Uuid, quantity: i32) {
        self.services
            .cart
            .add_item(
                user_id,
                AddCartItemInput {
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("failed to add cart item");
    }

    // ---- assertions helpers ------------------------------------------

    pub async fn variant_stock(&self, variant_id: Uuid) -> i32 {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("variant missing")
            .stock
    }

    pub async fn order_by_external_id(&self, external_order_id: &str) -> OrderModel {
        Order::find()
            .filter(order::Column::ExternalOrderId.eq(external_order_id))
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("order missing")
    }

    pub async fn order_count(&self) -> usize {
        Order::find().all(&*self.db).await.expect("query failed").len()
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .expect("query failed")
    }

    pub async fn coupon_used_count(&self, code: &str) -> i32 {
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("coupon missing")
            .used_count
    }

    pub async fn cart_len(&self, user_id: Uuid) -> usize {
        self.services
            .cart
            .list(user_id)
            .await
            .expect("cart read failed")
            .len()
    }

    /// Variant-row sanity check shared by the rollback tests.
    pub async fn variant(&self, variant_id: Uuid) -> product_variant::Model {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("variant missing")
    }

    // ---- HTTP --------------------------------------------------------

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(match body {
                Some(value) => Body::from(value.to_string()),
                None => Body::empty(),
            })
            .expect("request build failed");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed")
    }

    pub async fn request_as(
        &self,
        user_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.request_with_identity(user_id, None, method, uri, body)
            .await
    }

    pub async fn request_as_admin(
        &self,
        user_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.request_with_identity(user_id, Some("admin"), method, uri, body)
            .await
    }

    async fn request_with_identity(
        &self,
        user_id: Uuid,
        role: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_ID_HEADER, user_id.to_string())
            .header(USER_EMAIL_HEADER, "tester@example.com")
            .header(USER_NAME_HEADER, "Tester");
        if let Some(role) = role {
            builder = builder.header(USER_ROLE_HEADER, role);
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(match body {
                Some(value) => Body::from(value.to_string()),
                None => Body::empty(),
            })
            .expect("request build failed");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed")
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}

/// A settlement notification as the gateway would send it. Signatures are
/// accepted unconditionally by the test gateways.
pub fn notification(external_order_id: &str, transaction_status: &str) -> NotificationPayload {
    NotificationPayload {
        order_id: external_order_id.to_string(),
        status_code: "200".to_string(),
        gross_amount: "30000.00".to_string(),
        signature_key: "irrelevant-for-test-gateways".to_string(),
        transaction_status: transaction_status.to_string(),
        payment_type: "qris".to_string(),
        fraud_status: None,
    }
}

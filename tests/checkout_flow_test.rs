//! End-to-end checkout behavior against an in-memory database: stock
//! reservation, coupon discounts, rollback on failure, and the immediate
//! settlement performed by the auto-confirming gateway.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{FailingGateway, TestApp};
use rust_decimal_macros::dec;
use uuid::Uuid;

use toko_amplop_api::entities::coupon::CouponType;
use toko_amplop_api::entities::order::OrderStatus;
use toko_amplop_api::errors::ServiceError;
use toko_amplop_api::services::checkout::CheckoutInput;

fn checkout_input(user_id: Uuid, coupon_code: Option<&str>) -> CheckoutInput {
    CheckoutInput {
        user_id,
        user_email: "budi@example.com".to_string(),
        user_name: "Budi".to_string(),
        coupon_code: coupon_code.map(str::to_string),
    }
}

#[tokio::test]
async fn checkout_reserves_stock_and_snapshots_the_order() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let outcome = app
        .services
        .checkout
        .checkout(checkout_input(user, None))
        .await
        .expect("checkout failed");

    assert_eq!(outcome.total, dec!(30000));
    assert_eq!(outcome.status, OrderStatus::WaitingPayment);
    assert!(outcome.external_order_id.starts_with("TXN-"));
    assert_eq!(
        outcome.session_token,
        format!("manual-token-{}", outcome.external_order_id)
    );

    assert_eq!(app.variant_stock(variants[0].id).await, 2);
    assert_eq!(app.cart_len(user).await, 0);

    let order = app.order_by_external_id(&outcome.external_order_id).await;
    assert_eq!(order.subtotal, dec!(30000));
    assert_eq!(order.discount, dec!(0));
    assert_eq!(order.status, OrderStatus::WaitingPayment);
    assert!(order.paid_at.is_none());

    let items = app.order_items(order.id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Amplop Premium");
    assert_eq!(items[0].variant_name, "A4");
    assert_eq!(items[0].price, dec!(10000));
    assert_eq!(items[0].quantity, 3);
}

#[tokio::test]
async fn percentage_coupon_discounts_the_total() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.seed_coupon("SAVE20", CouponType::Percentage, dec!(20))
        .await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let outcome = app
        .services
        .checkout
        .checkout(checkout_input(user, Some("SAVE20")))
        .await
        .expect("checkout failed");

    assert_eq!(outcome.total, dec!(24000));
    let order = app.order_by_external_id(&outcome.external_order_id).await;
    assert_eq!(order.subtotal, dec!(30000));
    assert_eq!(order.discount, dec!(6000));
    assert_eq!(order.total, dec!(24000));
    assert_eq!(app.coupon_used_count("SAVE20").await, 1);
}

#[tokio::test]
async fn insufficient_stock_fails_without_side_effects() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 2)])
        .await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let err = app
        .services
        .checkout
        .checkout(checkout_input(user, None))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(app.variant_stock(variants[0].id).await, 2);
    assert_eq!(app.cart_len(user).await, 1);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn coupon_failure_rolls_back_the_reservation() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.seed_expired_coupon("OLD10", dec!(10)).await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let err = app
        .services
        .checkout
        .checkout(checkout_input(user, Some("OLD10")))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CouponExpired(_));
    // Stock was decremented inside the transaction; rollback undid it.
    assert_eq!(app.variant_stock(variants[0].id).await, 5);
    assert_eq!(app.cart_len(user).await, 1);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn gateway_failure_rolls_back_everything() {
    let app = TestApp::with_gateway(Arc::new(FailingGateway)).await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.seed_coupon("SAVE20", CouponType::Percentage, dec!(20))
        .await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let err = app
        .services
        .checkout
        .checkout(checkout_input(user, Some("SAVE20")))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PaymentGatewayError(_));
    assert_eq!(app.variant_stock(variants[0].id).await, 5);
    assert_eq!(app.cart_len(user).await, 1);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.coupon_used_count("SAVE20").await, 0);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .services
        .checkout
        .checkout(checkout_input(Uuid::new_v4(), None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CartEmpty);
}

#[tokio::test]
async fn unknown_coupon_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.add_to_cart(user, variants[0].id, 1).await;

    let err = app
        .services
        .checkout
        .checkout(checkout_input(user, Some("NOPE")))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CouponNotFound(_));
}

#[tokio::test]
async fn coupon_below_minimum_order_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.seed_coupon_with("BIG50", CouponType::Fixed, dec!(50000), dec!(100000), 0)
        .await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let err = app
        .services
        .checkout
        .checkout(checkout_input(user, Some("BIG50")))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CouponBelowMinOrder { .. });
}

#[tokio::test]
async fn coupon_usage_limit_blocks_further_checkouts() {
    let app = TestApp::new().await;
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 50)])
        .await;
    app.seed_coupon_with("ONCE", CouponType::Fixed, dec!(1000), dec!(0), 1)
        .await;

    let first_user = Uuid::new_v4();
    app.add_to_cart(first_user, variants[0].id, 1).await;
    app.services
        .checkout
        .checkout(checkout_input(first_user, Some("ONCE")))
        .await
        .expect("first checkout failed");

    let second_user = Uuid::new_v4();
    app.add_to_cart(second_user, variants[0].id, 1).await;
    let err = app
        .services
        .checkout
        .checkout(checkout_input(second_user, Some("ONCE")))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CouponUsageLimitReached(_));
}

#[tokio::test]
async fn multi_line_checkout_reserves_every_variant() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let premium = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    let classic = app
        .seed_product("Amplop Classic", &[("C6", dec!(2500), 10)])
        .await;
    app.add_to_cart(user, premium[0].id, 2).await;
    app.add_to_cart(user, classic[0].id, 4).await;

    let outcome = app
        .services
        .checkout
        .checkout(checkout_input(user, None))
        .await
        .expect("checkout failed");

    // 2 * 10000 + 4 * 2500
    assert_eq!(outcome.total, dec!(30000));
    assert_eq!(app.variant_stock(premium[0].id).await, 3);
    assert_eq!(app.variant_stock(classic[0].id).await, 6);

    let order = app.order_by_external_id(&outcome.external_order_id).await;
    assert_eq!(app.order_items(order.id).await.len(), 2);
}

#[tokio::test]
async fn auto_confirming_gateway_settles_immediately() {
    let app = TestApp::auto_confirming().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Premium", &[("A4", dec!(10000), 5)])
        .await;
    app.add_to_cart(user, variants[0].id, 1).await;

    let outcome = app
        .services
        .checkout
        .checkout(checkout_input(user, None))
        .await
        .expect("checkout failed");

    assert_eq!(outcome.status, OrderStatus::Processed);
    let order = app.order_by_external_id(&outcome.external_order_id).await;
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.payment_type.as_deref(), Some("mock_payment"));
    assert!(order.paid_at.is_some());
    // Settlement must not hand stock back.
    assert_eq!(app.variant_stock(variants[0].id).await, 4);
}

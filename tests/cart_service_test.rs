//! Cart behavior: upsert on add, ownership scoping, validation.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

use toko_amplop_api::errors::ServiceError;
use toko_amplop_api::services::cart::AddCartItemInput;

#[tokio::test]
async fn adding_the_same_variant_increments_quantity() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Classic", &[("C6", dec!(2500), 10)])
        .await;

    app.add_to_cart(user, variants[0].id, 2).await;
    app.add_to_cart(user, variants[0].id, 3).await;

    let lines = app.services.cart.list(user).await.expect("list failed");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].item.quantity, 5);
    assert_eq!(lines[0].product.name, "Amplop Classic");
    assert_eq!(lines[0].variant.name, "C6");
}

#[tokio::test]
async fn quantities_must_be_positive() {
    let app = TestApp::new().await;
    let variants = app
        .seed_product("Amplop Classic", &[("C6", dec!(2500), 10)])
        .await;

    let err = app
        .services
        .cart
        .add_item(
            Uuid::new_v4(),
            AddCartItemInput {
                variant_id: variants[0].id,
                quantity: 0,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn unknown_variant_cannot_be_added() {
    let app = TestApp::new().await;
    let err = app
        .services
        .cart
        .add_item(
            Uuid::new_v4(),
            AddCartItemInput {
                variant_id: Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn update_and_remove_are_scoped_to_the_owner() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Classic", &[("C6", dec!(2500), 10)])
        .await;
    app.add_to_cart(owner, variants[0].id, 2).await;
    let line = &app.services.cart.list(owner).await.expect("list failed")[0];

    let err = app
        .services
        .cart
        .update_item(stranger, line.item.id, 4)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .services
        .cart
        .remove_item(stranger, line.item.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let updated = app
        .services
        .cart
        .update_item(owner, line.item.id, 4)
        .await
        .expect("update failed");
    assert_eq!(updated.quantity, 4);

    app.services
        .cart
        .remove_item(owner, line.item.id)
        .await
        .expect("remove failed");
    assert_eq!(app.cart_len(owner).await, 0);
}

#[tokio::test]
async fn clearing_only_touches_the_callers_cart() {
    let app = TestApp::new().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let variants = app
        .seed_product("Amplop Classic", &[("C6", dec!(2500), 10)])
        .await;
    app.add_to_cart(first, variants[0].id, 1).await;
    app.add_to_cart(second, variants[0].id, 2).await;

    app.services
        .cart
        .clear_for_user(first)
        .await
        .expect("clear failed");

    assert_eq!(app.cart_len(first).await, 0);
    assert_eq!(app.cart_len(second).await, 1);
}

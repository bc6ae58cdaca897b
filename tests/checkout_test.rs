mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use farmdirect_api::{
    entities::{product, CartStatus, OrderStatus},
    errors::ServiceError,
    services::checkout::CheckoutInput,
};

fn checkout_input() -> CheckoutInput {
    CheckoutInput::new("12 Farm Road, Ibadan", "+2348012345678", Some("leave at gate"))
}

#[tokio::test]
async fn checkout_creates_pending_order_from_cart() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("add failed");

    let order = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .expect("checkout failed");

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal, dec!(200));
    assert_eq!(order.delivery_fee, dec!(200));
    assert_eq!(order.total_amount, dec!(400));
    assert!(order.order_number.starts_with("FD-"));

    let detail = app
        .state
        .services
        .orders
        .get_order(buyer, order.id)
        .await
        .expect("get order failed");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.items[0].product_name, listing.name);
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let buyer = app.register_buyer("buyer@test.dev").await;

    let err = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { ref field, .. } if field == "cart");
}

#[tokio::test]
async fn price_drift_aborts_checkout_with_mismatch() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("add failed");

    // Farmer re-prices after the buyer filled the cart.
    let mut active: product::ActiveModel = listing.into();
    active.unit_price = Set(dec!(110));
    active.update(&*app.state.db).await.expect("update failed");

    let err = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::PriceMismatch { expected, confirmed }
            if expected == dec!(400) && confirmed == dec!(420)
    );

    // The cart is still usable after the rollback.
    let cart = app
        .state
        .services
        .carts
        .get_cart(buyer.user_id)
        .await
        .expect("get failed");
    assert_eq!(cart.cart.status, CartStatus::Active);
    assert_eq!(cart.items.len(), 1);
}

#[tokio::test]
async fn invalid_contact_details_rejected() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 1)
        .await
        .expect("add failed");

    let err = app
        .state
        .services
        .checkout
        .submit(buyer, CheckoutInput::new("", "+2348012345678", None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { ref field, .. } if field == "delivery_address");

    let err = app
        .state
        .services
        .checkout
        .submit(buyer, CheckoutInput::new("12 Farm Road", "not a phone", None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { ref field, .. } if field == "phone_number");
}

#[tokio::test]
async fn later_cart_edits_never_touch_the_order() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("add failed");
    let order = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .expect("checkout failed");

    // Checkout consumed the cart; the next fetch opens a fresh one.
    let cart = app
        .state
        .services
        .carts
        .get_cart(buyer.user_id)
        .await
        .expect("get failed");
    assert!(cart.items.is_empty());

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 5)
        .await
        .expect("add failed");

    let detail = app
        .state
        .services
        .orders
        .get_order(buyer, order.id)
        .await
        .expect("get order failed");
    assert_eq!(detail.order.total_amount, dec!(400));
    assert_eq!(detail.items[0].quantity, 2);
}

#[tokio::test]
async fn order_is_not_visible_to_other_buyers() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let other = app.register_buyer("other@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 1)
        .await
        .expect("add failed");
    let order = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .expect("checkout failed");

    let err = app
        .state
        .services
        .orders
        .get_order(other, order.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn checkout_decrements_stock() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product_with_stock(&farmer, dec!(100), 5).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("add failed");
    app.state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .expect("checkout failed");

    let remaining = app
        .state
        .services
        .catalog
        .get_product(listing.id)
        .await
        .expect("get product failed");
    assert_eq!(remaining.stock, 3);
}

#[tokio::test]
async fn insufficient_stock_aborts_checkout() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product_with_stock(&farmer, dec!(100), 1).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("add failed");

    let err = app
        .state
        .services
        .checkout
        .submit(buyer, checkout_input())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // Rollback left the stock and the cart untouched.
    let unchanged = app
        .state
        .services
        .catalog
        .get_product(listing.id)
        .await
        .expect("get product failed");
    assert_eq!(unchanged.stock, 1);

    let cart = app
        .state
        .services
        .carts
        .get_cart(buyer.user_id)
        .await
        .expect("get failed");
    assert_eq!(cart.cart.status, CartStatus::Active);
}

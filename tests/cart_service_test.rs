mod common;

use assert_matches::assert_matches;
use common::TestApp;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use farmdirect_api::{errors::ServiceError, services::carts::compute_totals};
use uuid::Uuid;

#[tokio::test]
async fn empty_cart_has_zero_totals() {
    let app = TestApp::new().await;
    let buyer = app.register_buyer("buyer@test.dev").await;

    let cart = app
        .state
        .services
        .carts
        .get_cart(buyer.user_id)
        .await
        .expect("failed to fetch cart");

    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.subtotal, Decimal::ZERO);
    assert_eq!(cart.cart.delivery_fee, Decimal::ZERO);
    assert_eq!(cart.cart.total, Decimal::ZERO);
}

#[tokio::test]
async fn two_units_at_100_total_400_with_delivery() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    let cart = app
        .state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 2)
        .await
        .expect("failed to add item");

    assert_eq!(cart.cart.subtotal, dec!(200));
    assert_eq!(cart.cart.delivery_fee, dec!(200));
    assert_eq!(cart.cart.total, dec!(400));
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.items[0].unit_price, dec!(100));
}

#[tokio::test]
async fn adding_same_product_merges_quantities() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(50)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 1)
        .await
        .expect("first add failed");
    let cart = app
        .state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 3)
        .await
        .expect("second add failed");

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 4);
    assert_eq!(cart.items[0].line_total, dec!(200));
}

#[tokio::test]
async fn zero_quantity_rejected() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    let err = app
        .state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { ref field, .. } if field == "quantity");

    let err = app
        .state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, -3)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { ref field, .. } if field == "quantity");
}

#[tokio::test]
async fn set_quantity_below_one_rejected_not_treated_as_removal() {
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

    let err = app
        .state
        .services
        .carts
        .set_item_quantity(buyer.user_id, listing.id, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { .. });

    // The line is untouched.
    let cart = app
        .state
        .services
        .carts
        .get_cart(buyer.user_id)
        .await
        .expect("get failed");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn removing_absent_product_is_a_noop() {
    let app = TestApp::new().await;
    let buyer = app.register_buyer("buyer@test.dev").await;

    let cart = app
        .state
        .services
        .carts
        .remove_item(buyer.user_id, Uuid::new_v4())
        .await
        .expect("remove should not fail");
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn removing_last_item_drops_delivery_fee() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(75)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 1)
        .await
        .expect("add failed");
    let cart = app
        .state
        .services
        .carts
        .remove_item(buyer.user_id, listing.id)
        .await
        .expect("remove failed");

    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.delivery_fee, Decimal::ZERO);
    assert_eq!(cart.cart.total, Decimal::ZERO);
}

#[tokio::test]
async fn clear_empties_cart_and_totals() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let a = app.seed_product(&farmer, dec!(10)).await;
    let b = app.seed_product(&farmer, dec!(20)).await;

    app.state
        .services
        .carts
        .add_item(buyer.user_id, a.id, 2)
        .await
        .expect("add failed");
    app.state
        .services
        .carts
        .add_item(buyer.user_id, b.id, 1)
        .await
        .expect("add failed");

    let cart = app
        .state
        .services
        .carts
        .clear(buyer.user_id)
        .await
        .expect("clear failed");
    assert!(cart.items.is_empty());
    assert_eq!(cart.cart.total, Decimal::ZERO);
}

#[tokio::test]
async fn unavailable_product_cannot_be_added() {
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};

    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;
    let buyer = app.register_buyer("buyer@test.dev").await;
    let listing = app.seed_product(&farmer, dec!(100)).await;

    let mut active: farmdirect_api::entities::product::ActiveModel = listing.clone().into();
    active.available = Set(false);
    active
        .update(&*app.state.db)
        .await
        .expect("update failed");

    let err = app
        .state
        .services
        .carts
        .add_item(buyer.user_id, listing.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

proptest! {
    #[test]
    fn subtotal_is_sum_of_lines(
        lines in proptest::collection::vec((1i32..100, 1u32..100_000), 0..8),
        fee in 0u32..10_000,
    ) {
        let lines: Vec<(i32, Decimal)> = lines
            .into_iter()
            .map(|(quantity, cents)| (quantity, Decimal::from(cents) / Decimal::from(100)))
            .collect();
        let fee = Decimal::from(fee);

        let (subtotal, applied_fee, total) = compute_totals(&lines, fee);

        let expected: Decimal = lines
            .iter()
            .map(|(quantity, price)| *price * Decimal::from(*quantity))
            .sum();
        prop_assert_eq!(subtotal, expected);

        if lines.is_empty() {
            prop_assert_eq!(applied_fee, Decimal::ZERO);
            prop_assert_eq!(total, Decimal::ZERO);
        } else {
            prop_assert_eq!(applied_fee, fee);
            prop_assert_eq!(total, subtotal + fee);
        }
    }
}

mod common;

use common::TestApp;
use rust_decimal_macros::dec;

// Migrations must apply cleanly on the SQLite backend used by the test
// suite, including every decimal money column.
#[tokio::test]
async fn migrations_create_a_usable_schema_on_sqlite() {
    let app = TestApp::new().await;
    let farmer = app.register_farmer("farmer@test.dev").await;

    let listing = app.seed_product(&farmer, dec!(9999.5)).await;
    let fetched = app
        .state
        .services
        .catalog
        .get_product(listing.id)
        .await
        .expect("get product failed");

    assert_eq!(fetched.unit_price, dec!(9999.5));
    assert_eq!(fetched.stock, 100);
}

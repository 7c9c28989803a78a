mod common;

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use storefront_api::{
    dto::{
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::PlaceOrderRequest,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    pricing::MAX_LINE_QUANTITY,
    routes::params::OrderListQuery,
    services::{cart_service, order_service},
    state::AppState,
    status::{AddressType, OrderStatus, PaymentStatus},
};
use uuid::Uuid;

use common::{create_address, create_product, create_user, setup_state};

fn order_request(shipping_address_id: Uuid, billing_address_id: Uuid) -> PlaceOrderRequest {
    PlaceOrderRequest {
        shipping_address_id,
        billing_address_id,
        shipping_cost: None,
        payment_method: None,
        notes: None,
    }
}

async fn add(state: &AppState, user: &AuthUser, product_id: Uuid, quantity: i32) -> AppResult<()> {
    cart_service::add_item(state, user, AddToCartRequest { product_id, quantity }).await?;
    Ok(())
}

async fn order_count(state: &AppState, user: &AuthUser) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?)
}

// Cart -> order -> cancel, including the failure modes checked before anything is written.
#[tokio::test]
async fn cart_to_order_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, false).await?;
    let stranger = create_user(&state, false).await?;
    let admin = create_user(&state, true).await?;

    let shipping = create_address(&state, &user, AddressType::Shipping).await?;
    let billing = create_address(&state, &user, AddressType::Billing).await?;
    let foreign_address = create_address(&state, &stranger, AddressType::Shipping).await?;

    let widget = create_product(&state, "Widget X", Decimal::new(2999, 2), None).await?;
    let gadget = create_product(
        &state,
        "Gadget Y",
        Decimal::new(5999, 2),
        Some(Decimal::new(4999, 2)),
    )
    .await?;

    let request = |shipping_address_id: Uuid| PlaceOrderRequest {
        shipping_address_id,
        billing_address_id: billing,
        shipping_cost: Some(Decimal::new(500, 2)),
        payment_method: Some("card".into()),
        notes: None,
    };

    // An empty cart never produces an order.
    let empty = order_service::place_order(&state, &user, request(shipping)).await;
    assert!(matches!(empty, Err(AppError::EmptyCart)));
    let placed = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    assert_eq!(placed, 0);

    // Bad quantities and unknown products are rejected.
    let zero = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: widget.id,
            quantity: 0,
        },
    )
    .await;
    assert!(matches!(zero, Err(AppError::InvalidQuantity)));
    let missing = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::ProductNotFound)));

    // Adding the same product twice accumulates on one row.
    for _ in 0..2 {
        cart_service::add_item(
            &state,
            &user,
            AddToCartRequest {
                product_id: widget.id,
                quantity: 1,
            },
        )
        .await?;
    }
    let gadget_line = cart_service::add_item(
        &state,
        &user,
        AddToCartRequest {
            product_id: gadget.id,
            quantity: 3,
        },
    )
    .await?
    .data
    .expect("cart item");
    cart_service::update_quantity(
        &state,
        &user,
        gadget_line.id,
        UpdateCartItemRequest { quantity: 1 },
    )
    .await?;

    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 2);
    let widget_line = cart
        .items
        .iter()
        .find(|item| item.product.id == widget.id)
        .expect("widget line");
    assert_eq!(widget_line.quantity, 2);
    assert_eq!(cart.total_items, 3);
    assert_eq!(cart.total_price, Decimal::new(10997, 2));

    // Someone else's address is not usable.
    let foreign = order_service::place_order(&state, &user, request(foreign_address)).await;
    assert!(matches!(foreign, Err(AppError::InvalidAddress("shipping"))));

    // 2 x 29.99 + 49.99 (discounted) + 5.00 shipping.
    let order = order_service::place_order(&state, &user, request(shipping))
        .await?
        .data
        .expect("order");
    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.total_price, Decimal::new(11497, 2));
    assert_eq!(order.shipping_cost, Decimal::new(500, 2));
    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items_count, 3);
    let mut line_totals: Vec<Decimal> = order.items.iter().map(|i| i.total_price).collect();
    line_totals.sort();
    assert_eq!(line_totals, vec![Decimal::new(4999, 2), Decimal::new(5998, 2)]);

    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_price, Decimal::ZERO);

    // Line snapshots survive catalog changes.
    let widget_id = widget.id;
    let mut repriced: ProductActive = widget.into();
    repriced.price = Set(Decimal::new(9999, 2));
    repriced.name = Set("Widget X v2".into());
    repriced.update(&state.orm).await?;

    let fetched = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .expect("order");
    let widget_item = fetched
        .items
        .iter()
        .find(|i| i.product_name == "Widget X")
        .expect("snapshot keeps the old name");
    assert_eq!(widget_item.product_price, Decimal::new(2999, 2));
    assert_eq!(fetched.total_price, Decimal::new(11497, 2));

    // ...and the product disappearing altogether.
    Products::delete_by_id(widget_id).exec(&state.orm).await?;
    let fetched = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.items.len(), 2);
    let widget_item = fetched
        .items
        .iter()
        .find(|i| i.product_name == "Widget X")
        .expect("snapshot outlives the product");
    assert_eq!(widget_item.product, None);
    assert_eq!(widget_item.total_price, Decimal::new(5998, 2));
    assert_eq!(fetched.total_price, Decimal::new(11497, 2));

    // Visibility and ownership.
    let hidden = order_service::get_order(&state, &stranger, order.id).await;
    assert!(matches!(hidden, Err(AppError::Forbidden)));
    assert!(order_service::get_order(&state, &admin, order.id).await.is_ok());

    let listed = order_service::list_orders(&state, &user, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(listed.items.len(), 1);
    let strangers = order_service::list_orders(&state, &stranger, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert!(strangers.items.is_empty());

    // Cancel rules.
    let not_yours = order_service::cancel_order(&state, &stranger, order.id).await;
    assert!(matches!(not_yours, Err(AppError::Forbidden)));

    let cancelled = order_service::cancel_order(&state, &user, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);

    let again = order_service::cancel_order(&state, &user, order.id).await;
    assert!(matches!(again, Err(AppError::InvalidTransition { .. })));

    // Clearing an empty cart is a no-op.
    cart_service::clear_cart(&state, &user).await?;
    cart_service::clear_cart(&state, &user).await?;

    Ok(())
}

// Totals that the money columns cannot hold are price errors, not server faults.
#[tokio::test]
async fn oversized_orders_are_rejected_before_writing() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, false).await?;
    let shipping = create_address(&state, &user, AddressType::Shipping).await?;
    let billing = create_address(&state, &user, AddressType::Billing).await?;
    let yacht = create_product(&state, "Yacht", Decimal::new(6_000_000_000, 2), None).await?;
    let jet = create_product(&state, "Jet", Decimal::new(6_000_000_000, 2), None).await?;
    let pencil = create_product(&state, "Pencil", Decimal::new(10000, 2), None).await?;

    let bulk = add(&state, &user, pencil.id, 2_000_000).await;
    assert!(matches!(bulk, Err(AppError::InvalidQuantity)));

    add(&state, &user, pencil.id, MAX_LINE_QUANTITY).await?;
    let over = add(&state, &user, pencil.id, 1).await;
    assert!(matches!(over, Err(AppError::InvalidQuantity)));
    cart_service::clear_cart(&state, &user).await?;

    let two_yachts = add(&state, &user, yacht.id, 2).await;
    assert!(matches!(two_yachts, Err(AppError::PriceComputation(_))));

    // Each line fits the money column, their sum does not.
    add(&state, &user, yacht.id, 1).await?;
    add(&state, &user, jet.id, 1).await?;
    let result = order_service::place_order(&state, &user, order_request(shipping, billing)).await;
    assert!(matches!(result, Err(AppError::PriceComputation(_))));

    assert_eq!(order_count(&state, &user).await?, 0);
    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 2);

    Ok(())
}

// One line that cannot be written is skipped; the rest of the order commits.
#[tokio::test]
async fn failing_line_is_skipped_and_the_order_commits() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION reject_flagged_order_line() RETURNS trigger AS $$
        BEGIN
            IF NEW.product_name LIKE 'Rejected line%' THEN
                RAISE EXCEPTION 'order line rejected';
            END IF;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&state.pool)
    .await?;
    sqlx::query("DROP TRIGGER IF EXISTS reject_flagged_order_line ON order_items")
        .execute(&state.pool)
        .await?;
    sqlx::query(
        "CREATE TRIGGER reject_flagged_order_line BEFORE INSERT ON order_items \
         FOR EACH ROW EXECUTE FUNCTION reject_flagged_order_line()",
    )
    .execute(&state.pool)
    .await?;

    let user = create_user(&state, false).await?;
    let shipping = create_address(&state, &user, AddressType::Shipping).await?;
    let billing = create_address(&state, &user, AddressType::Billing).await?;
    let good = create_product(&state, "Notebook", Decimal::new(1000, 2), None).await?;
    let bad = create_product(&state, "Rejected line item", Decimal::new(2500, 2), None).await?;

    add(&state, &user, good.id, 2).await?;
    add(&state, &user, bad.id, 1).await?;

    let order = order_service::place_order(&state, &user, order_request(shipping, billing))
        .await?
        .data
        .expect("order");
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].product, Some(good.id));
    assert_eq!(order.items_count, 2);
    // The total is the quote taken before writing lines.
    assert_eq!(order.total_price, Decimal::new(4500, 2));

    let stored = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(stored.items.len(), 1);

    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert!(cart.items.is_empty());

    Ok(())
}

// A fault outside the per-line savepoints leaves neither an order nor a changed cart.
#[tokio::test]
async fn systemic_fault_rolls_the_whole_order_back() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION keep_pinned_cart_item() RETURNS trigger AS $$
        BEGIN
            IF EXISTS (SELECT 1 FROM products WHERE id = OLD.product_id AND name LIKE 'Pinned item%') THEN
                RAISE EXCEPTION 'cart item is pinned';
            END IF;
            RETURN OLD;
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&state.pool)
    .await?;
    sqlx::query("DROP TRIGGER IF EXISTS keep_pinned_cart_item ON cart_items")
        .execute(&state.pool)
        .await?;
    sqlx::query(
        "CREATE TRIGGER keep_pinned_cart_item BEFORE DELETE ON cart_items \
         FOR EACH ROW EXECUTE FUNCTION keep_pinned_cart_item()",
    )
    .execute(&state.pool)
    .await?;

    let user = create_user(&state, false).await?;
    let shipping = create_address(&state, &user, AddressType::Shipping).await?;
    let billing = create_address(&state, &user, AddressType::Billing).await?;
    let regular = create_product(&state, "Stapler", Decimal::new(1500, 2), None).await?;
    let pinned = create_product(&state, "Pinned item", Decimal::new(500, 2), None).await?;

    add(&state, &user, regular.id, 1).await?;
    add(&state, &user, pinned.id, 3).await?;

    let result = order_service::place_order(&state, &user, order_request(shipping, billing)).await;
    assert!(matches!(result, Err(AppError::OrderCreationFailed)));

    assert_eq!(order_count(&state, &user).await?, 0);
    let cart = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.total_items, 4);

    Ok(())
}

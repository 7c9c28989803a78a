mod common;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use storefront_api::{
    dto::{
        cart::AddToCartRequest,
        orders::PlaceOrderRequest,
        payments::{CreatePaymentRequest, ProcessPaymentRequest, RefundRequest},
    },
    entity::payments::{Column as PaymentCol, Entity as Payments},
    error::AppError,
    middleware::auth::AuthUser,
    models::Order,
    services::{cart_service, order_service, payment_service},
    state::AppState,
    status::{AddressType, OrderStatus, PaymentState, PaymentStatus, RefundStatus},
};

use common::{create_address, create_product, create_user, setup_state};

async fn place_order(state: &AppState, user: &AuthUser) -> anyhow::Result<Order> {
    let shipping = create_address(state, user, AddressType::Shipping).await?;
    let billing = create_address(state, user, AddressType::Billing).await?;
    let product = create_product(state, "Ledger Book", Decimal::new(2500, 2), None).await?;

    cart_service::add_item(
        state,
        user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let order = order_service::place_order(
        state,
        user,
        PlaceOrderRequest {
            shipping_address_id: shipping,
            billing_address_id: billing,
            shipping_cost: None,
            payment_method: None,
            notes: Some("leave at the door".into()),
        },
    )
    .await?
    .data
    .expect("order");
    Ok(order)
}

// Payment creation, completion and refund rules against one order.
#[tokio::test]
async fn payment_and_refund_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, false).await?;
    let stranger = create_user(&state, false).await?;
    let order = place_order(&state, &user).await?;
    assert_eq!(order.total_price, Decimal::new(5000, 2));

    // Refunds need a paid order.
    let unpaid = payment_service::request_refund(
        &state,
        &user,
        RefundRequest {
            order_id: order.id,
            amount: None,
            reason: "changed my mind".into(),
        },
    )
    .await;
    assert!(matches!(unpaid, Err(AppError::OrderNotPaid)));

    // Orders are only payable by their owner.
    let foreign = payment_service::create_payment(
        &state,
        &stranger,
        CreatePaymentRequest {
            order_id: Some(order.id),
            payment_method: Some("card".into()),
        },
    )
    .await;
    assert!(matches!(foreign, Err(AppError::OrderNotFound)));

    let missing_method = payment_service::create_payment(
        &state,
        &user,
        CreatePaymentRequest {
            order_id: Some(order.id),
            payment_method: None,
        },
    )
    .await;
    assert!(matches!(missing_method, Err(AppError::BadRequest(_))));

    let payment = payment_service::create_payment(
        &state,
        &user,
        CreatePaymentRequest {
            order_id: Some(order.id),
            payment_method: Some("card".into()),
        },
    )
    .await?
    .data
    .expect("payment");
    assert_eq!(payment.payment_id, format!("PAY-{}", order.order_number));
    assert_eq!(payment.status, PaymentState::Pending);
    assert_eq!(payment.amount, order.total_price);
    assert_eq!(payment.currency, "USD");

    let not_mine = payment_service::complete_payment(
        &state,
        &stranger,
        ProcessPaymentRequest {
            payment_id: Some(payment.payment_id.clone()),
        },
    )
    .await;
    assert!(matches!(not_mine, Err(AppError::PaymentNotFound)));

    let completed = payment_service::complete_payment(
        &state,
        &user,
        ProcessPaymentRequest {
            payment_id: Some(payment.payment_id.clone()),
        },
    )
    .await?
    .data
    .expect("payment");
    assert_eq!(completed.status, PaymentState::Completed);

    let paid = order_service::get_order(&state, &user, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order_status, OrderStatus::Processing);
    assert_eq!(paid.payment_id.as_deref(), Some(payment.payment_id.as_str()));

    // Completing twice fails and leaves the payment completed.
    let twice = payment_service::complete_payment(
        &state,
        &user,
        ProcessPaymentRequest {
            payment_id: Some(payment.payment_id.clone()),
        },
    )
    .await;
    assert!(matches!(twice, Err(AppError::AlreadyCompleted)));

    // A paid order cannot get another payment row.
    let repay = payment_service::create_payment(
        &state,
        &user,
        CreatePaymentRequest {
            order_id: Some(order.id),
            payment_method: Some("card".into()),
        },
    )
    .await;
    assert!(matches!(repay, Err(AppError::AlreadyPaid)));
    let rows = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .count(&state.orm)
        .await?;
    assert_eq!(rows, 1);

    // One refund per order, defaulting to the order total.
    let refund = payment_service::request_refund(
        &state,
        &user,
        RefundRequest {
            order_id: order.id,
            amount: None,
            reason: "damaged".into(),
        },
    )
    .await?
    .data
    .expect("refund");
    assert_eq!(refund.amount, order.total_price);
    assert_eq!(refund.status, RefundStatus::Pending);
    assert_eq!(refund.payment, Some(completed.id));

    let duplicate = payment_service::request_refund(
        &state,
        &user,
        RefundRequest {
            order_id: order.id,
            amount: Some(Decimal::new(1000, 2)),
            reason: "again".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateRefund)));

    Ok(())
}

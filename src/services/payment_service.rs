use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::{CreatePaymentRequest, ProcessPaymentRequest, RefundRequest},
    entity::{
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
        refunds::{ActiveModel as RefundActive, Column as RefundCol, Entity as Refunds, Model as RefundModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Payment, Refund},
    response::{ApiResponse, Meta},
    state::AppState,
    status::{PaymentState, PaymentStatus, RefundStatus, on_payment_completed},
};

const DEFAULT_CURRENCY: &str = "USD";

/// Opens a pending payment for one of the caller's unpaid orders.
///
/// The payment id is derived from the order number, so asking again for the
/// same order reuses the open attempt instead of creating a second row.
pub async fn create_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let order_id = payload
        .order_id
        .ok_or_else(|| AppError::BadRequest("order_id is required".into()))?;
    let payment_method = payload
        .payment_method
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("payment_method is required".into()))?;

    let txn = state.orm.begin().await?;
    let order = Orders::find()
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    if order.payment_status == PaymentStatus::Paid.as_str() {
        return Err(AppError::AlreadyPaid);
    }

    let payment_id = payment_id_for(&order.order_number);
    let existing = Payments::find()
        .filter(PaymentCol::PaymentId.eq(payment_id.as_str()))
        .one(&txn)
        .await?;

    let payment = match existing {
        Some(open) => {
            let mut active: PaymentActive = open.into();
            active.payment_method = Set(payment_method);
            active.amount = Set(order.total_price);
            active.status = Set(PaymentState::Pending.as_str().to_string());
            active.update(&txn).await?
        }
        None => {
            PaymentActive {
                id: Set(Uuid::new_v4()),
                payment_id: Set(payment_id),
                user_id: Set(user.user_id),
                order_id: Set(order.id),
                amount: Set(order.total_price),
                currency: Set(DEFAULT_CURRENCY.to_string()),
                payment_method: Set(payment_method),
                status: Set(PaymentState::Pending.as_str().to_string()),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?
        }
    };
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, order_id = %order.id, payment_id = %payment.payment_id, "payment created");
    audit::record(
        &state.pool,
        user.user_id,
        "payment_create",
        "payments",
        serde_json::json!({ "order_id": order.id, "payment_id": payment.payment_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment created",
        payment_from_entity(payment)?,
        Some(Meta::empty()),
    ))
}

/// Marks a payment completed and moves its order to paid/processing in the
/// same transaction.
pub async fn complete_payment(
    state: &AppState,
    user: &AuthUser,
    payload: ProcessPaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let payment_id = payload
        .payment_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("payment_id is required".into()))?;

    let txn = state.orm.begin().await?;
    let payment = Payments::find()
        .filter(PaymentCol::PaymentId.eq(payment_id.as_str()))
        .filter(PaymentCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    if payment.status == PaymentState::Completed.as_str() {
        return Err(AppError::AlreadyCompleted);
    }

    let order = Orders::find_by_id(payment.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    let mut active: PaymentActive = payment.into();
    active.status = Set(PaymentState::Completed.as_str().to_string());
    let payment = active.update(&txn).await?;

    let (order_status, payment_status) = on_payment_completed();
    let mut order: OrderActive = order.into();
    order.order_status = Set(order_status.as_str().to_string());
    order.payment_status = Set(payment_status.as_str().to_string());
    order.payment_id = Set(Some(payment.payment_id.clone()));
    order.payment_method = Set(Some(payment.payment_method.clone()));
    order.updated_at = Set(Utc::now().into());
    order.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, order_id = %payment.order_id, payment_id = %payment.payment_id, "payment completed");
    audit::record(
        &state.pool,
        user.user_id,
        "payment_complete",
        "payments",
        serde_json::json!({ "order_id": payment.order_id, "payment_id": payment.payment_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment processed successfully",
        payment_from_entity(payment)?,
        Some(Meta::empty()),
    ))
}

/// At most one refund per paid order. The amount defaults to the order total.
pub async fn request_refund(
    state: &AppState,
    user: &AuthUser,
    payload: RefundRequest,
) -> AppResult<ApiResponse<Refund>> {
    let txn = state.orm.begin().await?;

    // The row lock serializes concurrent refund requests for one order.
    let order = Orders::find()
        .filter(OrderCol::Id.eq(payload.order_id))
        .filter(OrderCol::UserId.eq(user.user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    if order.payment_status != PaymentStatus::Paid.as_str() {
        return Err(AppError::OrderNotPaid);
    }

    let existing = Refunds::find()
        .filter(RefundCol::OrderId.eq(order.id))
        .count(&txn)
        .await?;
    if existing > 0 {
        return Err(AppError::DuplicateRefund);
    }

    let amount = refund_amount(payload.amount, order.total_price)?;

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .filter(PaymentCol::Status.eq(PaymentState::Completed.as_str()))
        .order_by_desc(PaymentCol::CreatedAt)
        .one(&txn)
        .await?;

    let refund = RefundActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        payment_id: Set(payment.map(|p| p.id)),
        amount: Set(amount),
        reason: Set(payload.reason),
        status: Set(RefundStatus::Pending.as_str().to_string()),
        refund_id: Set(None),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, order_id = %order.id, amount = %refund.amount, "refund requested");
    audit::record(
        &state.pool,
        user.user_id,
        "refund_request",
        "refunds",
        serde_json::json!({ "order_id": order.id, "refund_id": refund.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund request submitted",
        refund_from_entity(refund)?,
        Some(Meta::empty()),
    ))
}

fn payment_id_for(order_number: &str) -> String {
    format!("PAY-{order_number}")
}

fn refund_amount(requested: Option<Decimal>, order_total: Decimal) -> AppResult<Decimal> {
    let Some(amount) = requested else {
        return Ok(order_total);
    };
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest("refund amount must be positive".into()));
    }
    if amount > order_total {
        return Err(AppError::BadRequest(
            "refund amount exceeds the order total".into(),
        ));
    }
    Ok(amount)
}

fn payment_from_entity(model: PaymentModel) -> AppResult<Payment> {
    Ok(Payment {
        id: model.id,
        payment_id: model.payment_id,
        user: model.user_id,
        order: model.order_id,
        amount: model.amount,
        currency: model.currency,
        payment_method: model.payment_method,
        status: model.status.parse()?,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn refund_from_entity(model: RefundModel) -> AppResult<Refund> {
    Ok(Refund {
        id: model.id,
        order: model.order_id,
        payment: model.payment_id,
        amount: model.amount,
        reason: model.reason,
        status: model.status.parse()?,
        refund_id: model.refund_id,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

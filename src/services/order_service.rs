use std::collections::HashMap;

use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{OrderList, PlaceOrderRequest},
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::Entity as Carts,
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner_or_admin},
    models::{Order, OrderItem},
    pricing::{CartLine, LineSnapshot, quote_order},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service::get_or_create_cart,
    state::AppState,
    status::{OrderStatus, PaymentStatus},
};

const ORDER_NUMBER_PREFIX: &str = "ORD-";
const ORDER_NUMBER_LEN: usize = 16;
const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Converts the caller's cart into an order.
///
/// The order row, its line snapshots and the cart clear share one transaction.
/// Each line is written inside its own savepoint: a line that fails to insert
/// is rolled back alone and skipped, while any other fault drops the whole
/// transaction and surfaces `OrderCreationFailed`. The cart row is locked for
/// the duration, so a second placement against the same cart waits and then
/// finds it empty.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_own_address(state, user.user_id, payload.shipping_address_id, "shipping").await?;
    ensure_own_address(state, user.user_id, payload.billing_address_id, "billing").await?;

    let cart = get_or_create_cart(&state.orm, user.user_id).await?;

    let txn = state.orm.begin().await.map_err(creation_failed)?;
    Carts::find_by_id(cart.id)
        .lock(LockType::Update)
        .one(&txn)
        .await
        .map_err(creation_failed)?
        .ok_or(AppError::EmptyCart)?;

    let lines = load_cart_lines(&txn, cart.id).await.map_err(creation_failed)?;
    let quote = quote_order(&lines, payload.shipping_cost)?;

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        order_number: Set(generate_order_number()),
        shipping_address_id: Set(Some(payload.shipping_address_id)),
        billing_address_id: Set(Some(payload.billing_address_id)),
        order_status: Set(OrderStatus::Pending.as_str().to_string()),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        shipping_cost: Set(quote.shipping_cost),
        total_price: Set(quote.total_price),
        payment_method: Set(payload.payment_method),
        payment_id: Set(None),
        notes: Set(payload.notes),
        tracking_number: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await
    .map_err(creation_failed)?;

    let mut items = Vec::with_capacity(quote.lines.len());
    for line in &quote.lines {
        let savepoint = txn.begin().await.map_err(creation_failed)?;
        match insert_line(&savepoint, order.id, line).await {
            Ok(item) => {
                savepoint.commit().await.map_err(creation_failed)?;
                items.push(item);
            }
            Err(err) => {
                savepoint.rollback().await.map_err(creation_failed)?;
                tracing::warn!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    error = %err,
                    "skipping order line that failed to persist"
                );
            }
        }
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await
        .map_err(creation_failed)?;

    txn.commit().await.map_err(creation_failed)?;

    tracing::info!(
        user_id = %user.user_id,
        order_id = %order.id,
        order_number = %order.order_number,
        lines = items.len(),
        total = %order.total_price,
        "order placed"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        order_from_entity(order, items)?,
        Some(Meta::empty()),
    ))
}

/// Staff see every order, customers only their own. Newest first unless asked otherwise.
pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if !user.is_staff {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse()?;
        condition = condition.add(OrderCol::OrderStatus.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = hydrate_orders(&state.orm, orders).await?;

    Ok(ApiResponse::success(
        "Ok",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::OrderNotFound)?;
    ensure_owner_or_admin(user, &order)?;

    let items = load_order_items(&state.orm, order.id).await?;
    Ok(ApiResponse::success(
        "OK",
        order_from_entity(order, items)?,
        Some(Meta::empty()),
    ))
}

/// Only pending or processing orders can be cancelled, by their owner or staff.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::OrderNotFound)?;
    ensure_owner_or_admin(user, &order)?;

    let current: OrderStatus = order.order_status.parse()?;
    let next = current.cancel()?;

    let mut active: OrderActive = order.into();
    active.order_status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    let items = load_order_items(&txn, order.id).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, order_id = %order.id, from = %current, "order cancelled");
    audit::record(
        &state.pool,
        user.user_id,
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": current.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        order_from_entity(order, items)?,
        Some(Meta::empty()),
    ))
}

/// `ORD-` followed by 16 random uppercase alphanumerics. Uniqueness is left to
/// the database constraint.
pub fn generate_order_number() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ORDER_NUMBER_LEN)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.random_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("{ORDER_NUMBER_PREFIX}{suffix}")
}

async fn ensure_own_address(
    state: &AppState,
    user_id: Uuid,
    address_id: Uuid,
    role: &'static str,
) -> AppResult<()> {
    let owned = Addresses::find()
        .filter(AddressCol::Id.eq(address_id))
        .filter(AddressCol::UserId.eq(user_id))
        .count(&state.orm)
        .await?;
    if owned == 0 {
        return Err(AppError::InvalidAddress(role));
    }
    Ok(())
}

async fn load_cart_lines<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<Vec<CartLine>, DbErr> {
    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_asc(CartItemCol::CreatedAt)
        .find_also_related(Products)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| {
            let product = product?;
            Some(CartLine {
                cart_item_id: item.id,
                product_id: product.id,
                product_name: product.name,
                price: product.price,
                discount_price: product.discount_price,
                quantity: item.quantity,
            })
        })
        .collect())
}

async fn insert_line<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    line: &LineSnapshot,
) -> Result<OrderItemModel, DbErr> {
    OrderItemActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        product_id: Set(Some(line.product_id)),
        product_name: Set(line.product_name.clone()),
        product_price: Set(line.unit_price),
        quantity: Set(line.quantity),
        total_price: Set(line.line_total),
    }
    .insert(conn)
    .await
}

fn creation_failed(err: DbErr) -> AppError {
    tracing::error!(error = %err, "order creation aborted");
    AppError::OrderCreationFailed
}

async fn load_order_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItemModel>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?)
}

/// Attach line items to a page of orders with one extra query.
pub(crate) async fn hydrate_orders<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<Order>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut grouped: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
    for item in OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(ids))
        .all(conn)
        .await?
    {
        grouped.entry(item.order_id).or_default().push(item);
    }

    orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            order_from_entity(order, items)
        })
        .collect()
}

pub(crate) fn order_from_entity(model: OrderModel, items: Vec<OrderItemModel>) -> AppResult<Order> {
    let items_count = items.iter().map(|i| i64::from(i.quantity)).sum();
    Ok(Order {
        id: model.id,
        order_number: model.order_number,
        user: model.user_id,
        shipping_address: model.shipping_address_id,
        billing_address: model.billing_address_id,
        order_status: model.order_status.parse()?,
        payment_status: model.payment_status.parse()?,
        shipping_cost: model.shipping_cost,
        total_price: model.total_price,
        items: items.into_iter().map(order_item_from_entity).collect(),
        items_count,
        payment_method: model.payment_method,
        payment_id: model.payment_id,
        notes: model.notes,
        tracking_number: model.tracking_number,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        product: model.product_id,
        product_name: model.product_name,
        product_price: model.product_price,
        quantity: model.quantity,
        total_price: model.total_price,
    }
}

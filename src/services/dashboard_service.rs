use rust_decimal::Decimal;
use sea_orm::{EntityTrait, QueryOrder, QuerySelect};
use uuid::Uuid;

use crate::{
    dto::{
        dashboard::{DashboardSummary, OrderStatusCounts, TopProduct, TopProductList},
        orders::OrderList,
    },
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    services::order_service::hydrate_orders,
    state::AppState,
    status::{OrderStatus, PaymentStatus},
};

const RECENT_ORDERS: u64 = 10;
const TOP_PRODUCTS: i64 = 10;

#[derive(sqlx::FromRow)]
struct TopProductRow {
    id: Uuid,
    name: String,
    slug: String,
    price: Decimal,
    order_count: i64,
}

pub async fn summary(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardSummary>> {
    ensure_admin(user)?;

    let (total_orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;
    let (total_customers,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE is_staff = FALSE")
            .fetch_one(&state.pool)
            .await?;
    let (total_products,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
        .fetch_one(&state.pool)
        .await?;
    let (total_revenue,): (Decimal,) = sqlx::query_as(
        "SELECT COALESCE(SUM(total_price), 0) FROM orders WHERE payment_status = $1",
    )
    .bind(PaymentStatus::Paid.as_str())
    .fetch_one(&state.pool)
    .await?;

    let grouped: Vec<(String, i64)> =
        sqlx::query_as("SELECT order_status, COUNT(*) FROM orders GROUP BY order_status")
            .fetch_all(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "Dashboard summary",
        DashboardSummary {
            total_orders,
            total_revenue,
            total_customers,
            total_products,
            order_status: status_counts(&grouped),
        },
        Some(Meta::empty()),
    ))
}

pub async fn recent_orders(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;

    let orders = Orders::find()
        .order_by_desc(OrderCol::CreatedAt)
        .limit(RECENT_ORDERS)
        .all(&state.orm)
        .await?;
    let items = hydrate_orders(&state.orm, orders).await?;
    let total = items.len() as i64;

    Ok(ApiResponse::success(
        "Recent orders",
        OrderList { items },
        Some(Meta::new(1, RECENT_ORDERS as i64, total)),
    ))
}

/// Products ranked by how many order lines reference them.
pub async fn top_products(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<TopProductList>> {
    ensure_admin(user)?;

    let rows = sqlx::query_as::<_, TopProductRow>(
        r#"
        SELECT p.id, p.name, p.slug, p.price, COUNT(oi.id) AS order_count
        FROM products p
        LEFT JOIN order_items oi ON oi.product_id = p.id
        GROUP BY p.id, p.name, p.slug, p.price
        ORDER BY order_count DESC, p.name ASC
        LIMIT $1
        "#,
    )
    .bind(TOP_PRODUCTS)
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<TopProduct> = rows
        .into_iter()
        .map(|row| TopProduct {
            id: row.id,
            name: row.name,
            slug: row.slug,
            price: row.price,
            order_count: row.order_count,
        })
        .collect();
    let total = items.len() as i64;

    Ok(ApiResponse::success(
        "Top products",
        TopProductList { items },
        Some(Meta::new(1, TOP_PRODUCTS, total)),
    ))
}

// Statuses with no orders still appear with a zero count.
fn status_counts(grouped: &[(String, i64)]) -> OrderStatusCounts {
    let count = |status: OrderStatus| {
        grouped
            .iter()
            .find(|(s, _)| s == status.as_str())
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };
    OrderStatusCounts {
        pending: count(OrderStatus::Pending),
        processing: count(OrderStatus::Processing),
        shipped: count(OrderStatus::Shipped),
        delivered: count(OrderStatus::Delivered),
        cancelled: count(OrderStatus::Cancelled),
        refunded: count(OrderStatus::Refunded),
    }
}

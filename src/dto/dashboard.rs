use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub shipped: i64,
    pub delivered: i64,
    pub cancelled: i64,
    pub refunded: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub total_orders: i64,
    pub total_revenue: Decimal,
    pub total_customers: i64,
    pub total_products: i64,
    pub order_status: OrderStatusCounts,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub order_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProductList {
    pub items: Vec<TopProduct>,
}

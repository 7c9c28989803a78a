use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::status::{AddressType, OrderStatus, PaymentState, PaymentStatus, RefundStatus};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub address_type: AddressType,
    pub street_address: String,
    pub apartment_address: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub is_default: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductImage {
    pub id: Uuid,
    pub image: String,
    pub is_primary: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category: Uuid,
    pub category_name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub current_price: Decimal,
    pub discount_percent: i32,
    pub stock: i32,
    pub is_available: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub images: Vec<ProductImage>,
    pub average_rating: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Review {
    pub id: Uuid,
    pub product: Uuid,
    pub user: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub user_email: String,
    pub user_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub items: Vec<CartItem>,
    pub total_price: Decimal,
    pub total_items: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub product: Option<Uuid>,
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user: Uuid,
    pub shipping_address: Option<Uuid>,
    pub billing_address: Option<Uuid>,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_cost: Decimal,
    pub total_price: Decimal,
    pub items: Vec<OrderItem>,
    pub items_count: i64,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub payment_id: String,
    pub user: Uuid,
    pub order: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Refund {
    pub id: Uuid,
    pub order: Uuid,
    pub payment: Option<Uuid>,
    pub amount: Decimal,
    pub reason: String,
    pub status: RefundStatus,
    pub refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Option<Uuid>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessPaymentRequest {
    pub payment_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
}

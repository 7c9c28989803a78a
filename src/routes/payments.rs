use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::payments::{CreatePaymentRequest, ProcessPaymentRequest, RefundRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Payment, Refund},
    response::{ApiResponse, ErrorResponse},
    routes::extract::AppJson,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_payment))
        .route("/process", post(process_payment))
        .route("/refund", post(request_refund))
}

#[utoipa::path(
    post,
    path = "/api/payments/create",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Pending payment for an order", body = ApiResponse<Payment>),
        (status = 400, description = "Missing fields or order already paid", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreatePaymentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Payment>>)> {
    let resp = payment_service::create_payment(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/payments/process",
    request_body = ProcessPaymentRequest,
    responses(
        (status = 200, description = "Payment completed, order paid", body = ApiResponse<Payment>),
        (status = 400, description = "Payment already completed", body = ErrorResponse),
        (status = 404, description = "Payment not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn process_payment(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<ProcessPaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::complete_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/refund",
    request_body = RefundRequest,
    responses(
        (status = 201, description = "Refund requested", body = ApiResponse<Refund>),
        (status = 400, description = "Order not paid or refund already requested", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn request_refund(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<RefundRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Refund>>)> {
    let resp = payment_service::request_refund(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

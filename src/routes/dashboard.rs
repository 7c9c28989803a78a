use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{
        dashboard::{DashboardSummary, TopProductList},
        orders::OrderList,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::{ApiResponse, ErrorResponse},
    services::dashboard_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/recent-orders", get(recent_orders))
        .route("/top-products", get(top_products))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/summary",
    responses(
        (status = 200, description = "Order, revenue, customer and product totals (admin only)", body = ApiResponse<DashboardSummary>),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardSummary>>> {
    let resp = dashboard_service::summary(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/recent-orders",
    responses(
        (status = 200, description = "Ten most recent orders (admin only)", body = ApiResponse<OrderList>),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn recent_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = dashboard_service::recent_orders(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/top-products",
    responses(
        (status = 200, description = "Ten most ordered products (admin only)", body = ApiResponse<TopProductList>),
        (status = 403, description = "Forbidden", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn top_products(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<TopProductList>>> {
    let resp = dashboard_service::top_products(&state, &user).await?;
    Ok(Json(resp))
}

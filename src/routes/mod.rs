use axum::Router;

use crate::state::AppState;

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod dashboard;
pub mod doc;
pub mod extract;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod reviews;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/addresses", addresses::router())
        .nest("/categories", products::category_router())
        .nest("/products", products::router())
        .nest("/reviews", reviews::router())
        .nest("/cart", cart::router())
        .nest("/cart-items", cart::item_router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/dashboard", dashboard::router())
}

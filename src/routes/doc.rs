use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
        auth::{AccessToken, LoginRequest, RefreshRequest, RegisterRequest, TokenPair, UpdateProfileRequest},
        cart::{AddToCartRequest, CartItemList, UpdateCartItemRequest},
        dashboard::{DashboardSummary, OrderStatusCounts, TopProduct, TopProductList},
        orders::{OrderList, PlaceOrderRequest},
        payments::{CreatePaymentRequest, ProcessPaymentRequest, RefundRequest},
        products::{
            AddProductImageRequest, CategoryList, CreateCategoryRequest, CreateProductRequest,
            CreateReviewRequest, ProductList, ReviewList, UpdateCategoryRequest,
            UpdateProductRequest, UpdateReviewRequest,
        },
    },
    models::{
        Address, Cart, CartItem, Category, Order, OrderItem, Payment, Product, ProductImage,
        Refund, Review, User,
    },
    response::{ApiResponse, ErrorResponse, Meta},
    routes::{addresses, auth, cart, dashboard, health, orders, params, payments, products, reviews},
    status::{AddressType, OrderStatus, PaymentState, PaymentStatus, RefundStatus},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        auth::profile,
        auth::update_profile,
        addresses::list_addresses,
        addresses::create_address,
        addresses::get_address,
        addresses::update_address,
        addresses::delete_address,
        products::list_categories,
        products::get_category,
        products::create_category,
        products::update_category,
        products::delete_category,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::add_product_image,
        products::list_product_reviews,
        products::create_product_review,
        reviews::list_reviews,
        reviews::get_review,
        reviews::update_review,
        reviews::delete_review,
        cart::get_cart,
        cart::clear_cart,
        cart::list_cart_items,
        cart::add_to_cart,
        cart::get_cart_item,
        cart::update_cart_item,
        cart::remove_from_cart,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        payments::create_payment,
        payments::process_payment,
        payments::request_refund,
        dashboard::summary,
        dashboard::recent_orders,
        dashboard::top_products
    ),
    components(
        schemas(
            User,
            Address,
            Category,
            Product,
            ProductImage,
            Review,
            Cart,
            CartItem,
            Order,
            OrderItem,
            Payment,
            Refund,
            AddressType,
            OrderStatus,
            PaymentStatus,
            PaymentState,
            RefundStatus,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            UpdateProfileRequest,
            TokenPair,
            AccessToken,
            CreateAddressRequest,
            UpdateAddressRequest,
            AddressList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            AddProductImageRequest,
            ProductList,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewList,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemList,
            PlaceOrderRequest,
            OrderList,
            CreatePaymentRequest,
            ProcessPaymentRequest,
            RefundRequest,
            DashboardSummary,
            OrderStatusCounts,
            TopProduct,
            TopProductList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ErrorResponse,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Cart>,
            ApiResponse<Order>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, tokens and profile"),
        (name = "Addresses", description = "Shipping and billing addresses"),
        (name = "Categories", description = "Catalog categories"),
        (name = "Products", description = "Catalog products"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Cart", description = "Cart and cart items"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Payment and refund ledger"),
        (name = "Dashboard", description = "Admin reporting"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#![allow(dead_code)]

use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::addresses::CreateAddressRequest,
    entity::{
        categories::ActiveModel as CategoryActive, products::ActiveModel as ProductActive,
        products::Model as ProductModel, users::ActiveModel as UserActive,
    },
    middleware::auth::AuthUser,
    services::address_service,
    state::AppState,
    status::AddressType,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret";

/// Connects and migrates, or returns `None` when no database is configured.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(&database_url).await?;

    Ok(Some(AppState {
        pool,
        orm,
        config: AppConfig::for_database(database_url, JWT_SECRET),
    }))
}

/// Unique per run so tests never collide on unique columns.
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

pub async fn create_user(state: &AppState, is_staff: bool) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{}@example.com", unique("user"))),
        password_hash: Set("not-a-real-hash".into()),
        first_name: Set("Test".into()),
        last_name: Set("User".into()),
        phone_number: Set(None),
        is_active: Set(true),
        is_staff: Set(is_staff),
        date_joined: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        is_staff,
    })
}

pub async fn create_product(
    state: &AppState,
    name: &str,
    price: Decimal,
    discount_price: Option<Decimal>,
) -> anyhow::Result<ProductModel> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test Category".into()),
        slug: Set(unique("category")),
        description: Set(None),
        image: Set(None),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category.id),
        name: Set(name.to_string()),
        slug: Set(unique("product")),
        description: Set(Some(format!("{name} for testing"))),
        price: Set(price),
        discount_price: Set(discount_price),
        stock: Set(10),
        is_available: Set(true),
        is_featured: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product)
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    address_type: AddressType,
) -> anyhow::Result<Uuid> {
    let resp = address_service::create_address(
        state,
        user,
        CreateAddressRequest {
            address_type,
            street_address: "1 Main Street".into(),
            apartment_address: None,
            city: "Springfield".into(),
            state: "IL".into(),
            country: "US".into(),
            postal_code: "62701".into(),
            is_default: true,
        },
    )
    .await?;
    Ok(resp.data.expect("address").id)
}

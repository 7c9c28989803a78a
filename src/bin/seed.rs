use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", "Store", "Admin", true).await?;
    let user_id = ensure_user(&pool, "user@example.com", "user123", "Test", "Customer", false).await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    is_staff: bool,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, is_staff)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE SET is_staff = EXCLUDED.is_staff
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(is_staff)
    .fetch_one(pool)
    .await?;

    sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(pool)
        .await?;

    println!("Ensured user {email} (staff={is_staff})");
    Ok(user_id)
}

async fn ensure_category(pool: &sqlx::PgPool, name: &str, slug: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug)
        VALUES ($1, $2, $3)
        ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let apparel = ensure_category(pool, "Apparel", "apparel").await?;
    let kitchen = ensure_category(pool, "Kitchen", "kitchen").await?;
    let books = ensure_category(pool, "Books", "books").await?;

    // (category, name, slug, description, price cents, discount cents, stock, featured)
    let products = vec![
        (apparel, "Axum Hoodie", "axum-hoodie", "Warm hoodie for Rustaceans", 5500, Some(4999), 50, true),
        (kitchen, "Ferris Mug", "ferris-mug", "Coffee tastes better with Ferris", 1200, None, 100, false),
        (apparel, "Rust Sticker Pack", "rust-sticker-pack", "Decorate your laptop", 500, None, 200, false),
        (books, "E-book: Async Rust", "ebook-async-rust", "Learn async Rust patterns", 2500, Some(1999), 75, true),
    ];

    for (category_id, name, slug, desc, price, discount, stock, featured) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, slug, description, price, discount_price, stock, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(name)
        .bind(slug)
        .bind(desc)
        .bind(Decimal::new(price, 2))
        .bind(discount.map(|d| Decimal::new(d, 2)))
        .bind(stock)
        .bind(featured)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}

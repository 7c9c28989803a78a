mod common;

use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use storefront_api::{
    dto::products::{CreateReviewRequest, UpdateReviewRequest},
    entity::categories::Entity as Categories,
    error::AppError,
    routes::params::ProductQuery,
    services::{dashboard_service, product_service, review_service},
};

use common::{create_product, create_user, setup_state, unique};

// Filters, reviews and the admin dashboard over a small catalog.
#[tokio::test]
async fn catalog_reviews_and_dashboard() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let token = unique("lamp");
    let lamp = create_product(&state, &format!("Desk {token}"), Decimal::new(1999, 2), None).await?;
    let category = Categories::find_by_id(lamp.category_id)
        .one(&state.orm)
        .await?
        .expect("category");

    let search = |min_price: Option<&str>, max_price: Option<&str>| ProductQuery {
        search: Some(token.to_uppercase()),
        category: Some(category.slug.clone()),
        min_price: min_price.map(str::to_string),
        max_price: max_price.map(str::to_string),
        ..Default::default()
    };

    // Case-insensitive search within the category; malformed bounds are ignored.
    let found = product_service::list_products(&state, search(Some("not-a-number"), None))
        .await?
        .data
        .expect("products");
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].id, lamp.id);
    assert_eq!(found.items[0].category_name, category.name);

    let priced_out = product_service::list_products(&state, search(Some("20.00"), Some("50")))
        .await?
        .data
        .expect("products");
    assert!(priced_out.items.is_empty());

    // Reviews feed the product's average rating.
    let alice = create_user(&state, false).await?;
    let bob = create_user(&state, false).await?;

    let out_of_range = review_service::create_review(
        &state,
        &alice,
        &lamp.slug,
        CreateReviewRequest {
            rating: 6,
            comment: String::new(),
        },
    )
    .await;
    assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

    let review = review_service::create_review(
        &state,
        &alice,
        &lamp.slug,
        CreateReviewRequest {
            rating: 4,
            comment: "bright".into(),
        },
    )
    .await?
    .data
    .expect("review");
    review_service::create_review(
        &state,
        &bob,
        &lamp.slug,
        CreateReviewRequest {
            rating: 5,
            comment: String::new(),
        },
    )
    .await?;

    let product = product_service::get_product(&state, &lamp.slug)
        .await?
        .data
        .expect("product");
    assert!((product.average_rating - 4.5).abs() < f64::EPSILON);

    let listed = review_service::list_product_reviews(&state, &lamp.slug)
        .await?
        .data
        .expect("reviews");
    assert_eq!(listed.items.len(), 2);

    let hijack = review_service::update_review(
        &state,
        &bob,
        review.id,
        UpdateReviewRequest {
            rating: Some(1),
            comment: None,
        },
    )
    .await;
    assert!(matches!(hijack, Err(AppError::Forbidden)));

    let unknown = review_service::list_product_reviews(&state, &unique("missing")).await;
    assert!(matches!(unknown, Err(AppError::ProductNotFound)));

    // Reporting is staff only.
    let denied = dashboard_service::summary(&state, &alice).await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    let admin = create_user(&state, true).await?;
    let summary = dashboard_service::summary(&state, &admin)
        .await?
        .data
        .expect("summary");
    assert!(summary.total_products >= 1);
    assert!(summary.total_customers >= 2);

    let top = dashboard_service::top_products(&state, &admin)
        .await?
        .data
        .expect("top products");
    assert!(top.items.len() <= 10);
    assert!(
        top.items
            .windows(2)
            .all(|pair| pair[0].order_count >= pair[1].order_count)
    );

    Ok(())
}

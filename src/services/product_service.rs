use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        AddProductImageRequest, CategoryList, CreateCategoryRequest, CreateProductRequest,
        ProductList, UpdateCategoryRequest, UpdateProductRequest,
    },
    entity::{
        categories::{
            ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories,
            Model as CategoryModel,
        },
        product_images::{
            ActiveModel as ImageActive, Column as ImageCol, Entity as ProductImages,
            Model as ImageModel,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
        reviews::{Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Product, ProductImage},
    pricing::{current_price, discount_percent},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<Category> = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_category(state: &AppState, slug: &str) -> AppResult<ApiResponse<Category>> {
    let category = find_category(state, slug).await?;
    Ok(ApiResponse::success("Category", category_from_entity(category), None))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let slug = validate_slug(&payload.slug)?;
    let exists = Categories::find()
        .filter(CategoryCol::Slug.eq(slug.as_str()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::BadRequest("category slug already exists".into()));
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description),
        image: Set(payload.image),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        user.user_id,
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing = find_category(state, slug).await?;

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(image) = payload.image {
        active.image = Set(Some(image));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let category = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Updated",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Categories::delete_many()
        .filter(CategoryCol::Slug.eq(slug))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "category_delete",
        "categories",
        serde_json::json!({ "slug": slug }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(category) = query.category.as_deref().filter(|s| !s.is_empty()) {
        condition = condition.add(CategoryCol::Slug.eq(category));
    }

    if let Some(min_price) = query.min_price() {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price() {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if query.featured_only() {
        condition = condition.add(Column::IsFeatured.eq(true));
    }

    if let Some(search) = query.search_term() {
        let pattern = format!("%{}%", escape_like(search));
        condition = condition.add(
            Condition::any()
                .add(Expr::col((Products, Column::Name)).ilike(pattern.clone()))
                .add(Expr::col((Products, Column::Description)).ilike(pattern)),
        );
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find()
        .inner_join(Categories)
        .filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = hydrate_products(&state.orm, models).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, slug: &str) -> AppResult<ApiResponse<Product>> {
    let model = find_product(state, slug).await?;
    let product = hydrate_product(&state.orm, model).await?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_prices(payload.price, payload.discount_price)?;
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }
    let slug = validate_slug(&payload.slug)?;
    ensure_category_exists(state, payload.category_id).await?;

    let exists = Products::find()
        .filter(Column::Slug.eq(slug.as_str()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::BadRequest("product slug already exists".into()));
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description),
        price: Set(payload.price),
        discount_price: Set(payload.discount_price),
        stock: Set(payload.stock),
        is_available: Set(payload.is_available),
        is_featured: Set(payload.is_featured),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let product = hydrate_product(&state.orm, product).await?;
    Ok(ApiResponse::success("Product created", product, Some(Meta::empty())))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = find_product(state, slug).await?;

    let price = payload.price.unwrap_or(existing.price);
    let discount_price = payload.discount_price.or(existing.discount_price);
    validate_prices(price, discount_price)?;
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(discount_price) = payload.discount_price {
        active.discount_price = Set(Some(discount_price));
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            return Err(AppError::BadRequest("stock cannot be negative".into()));
        }
        active.stock = Set(stock);
    }
    if let Some(is_available) = payload.is_available {
        active.is_available = Set(is_available);
    }
    if let Some(is_featured) = payload.is_featured {
        active.is_featured = Set(is_featured);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let product = hydrate_product(&state.orm, product).await?;
    Ok(ApiResponse::success("Updated", product, Some(Meta::empty())))
}

/// Order lines keep their copied name and price; their product reference is nulled.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_many()
        .filter(Column::Slug.eq(slug))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "product_delete",
        "products",
        serde_json::json!({ "slug": slug }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn add_product_image(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
    payload: AddProductImageRequest,
) -> AppResult<ApiResponse<ProductImage>> {
    ensure_admin(user)?;
    if payload.image.trim().is_empty() {
        return Err(AppError::BadRequest("image is required".into()));
    }
    let product = find_product(state, slug).await?;

    let image = ImageActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        image: Set(payload.image),
        is_primary: Set(payload.is_primary),
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Image added",
        image_from_entity(image),
        Some(Meta::empty()),
    ))
}

pub(crate) async fn hydrate_product<C: ConnectionTrait>(
    conn: &C,
    model: ProductModel,
) -> AppResult<Product> {
    hydrate_products(conn, vec![model])
        .await?
        .pop()
        .ok_or(AppError::ProductNotFound)
}

/// Attach category names, images and average ratings to a page of products.
pub(crate) async fn hydrate_products<C: ConnectionTrait>(
    conn: &C,
    models: Vec<ProductModel>,
) -> AppResult<Vec<Product>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }
    let product_ids: Vec<Uuid> = models.iter().map(|p| p.id).collect();
    let category_ids: Vec<Uuid> = models.iter().map(|p| p.category_id).collect();

    let category_names: HashMap<Uuid, String> = Categories::find()
        .filter(CategoryCol::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut images: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
    for image in ProductImages::find()
        .filter(ImageCol::ProductId.is_in(product_ids.clone()))
        .order_by_desc(ImageCol::IsPrimary)
        .all(conn)
        .await?
    {
        images
            .entry(image.product_id)
            .or_default()
            .push(image_from_entity(image));
    }

    let mut ratings: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for review in Reviews::find()
        .filter(ReviewCol::ProductId.is_in(product_ids))
        .all(conn)
        .await?
    {
        let entry = ratings.entry(review.product_id).or_insert((0, 0));
        entry.0 += i64::from(review.rating);
        entry.1 += 1;
    }

    Ok(models
        .into_iter()
        .map(|model| {
            let category_name = category_names
                .get(&model.category_id)
                .cloned()
                .unwrap_or_default();
            let images = images.remove(&model.id).unwrap_or_default();
            let average_rating = ratings
                .get(&model.id)
                .map(|(sum, count)| average(*sum, *count))
                .unwrap_or(0.0);
            product_from_entity(model, category_name, images, average_rating)
        })
        .collect())
}

async fn find_category(state: &AppState, slug: &str) -> AppResult<CategoryModel> {
    Categories::find()
        .filter(CategoryCol::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn find_product(state: &AppState, slug: &str) -> AppResult<ProductModel> {
    Products::find()
        .filter(Column::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::ProductNotFound)
}

async fn ensure_category_exists(state: &AppState, id: Uuid) -> AppResult<()> {
    match Categories::find_by_id(id).one(&state.orm).await? {
        Some(_) => Ok(()),
        None => Err(AppError::BadRequest("category not found".into())),
    }
}

fn validate_prices(price: Decimal, discount_price: Option<Decimal>) -> AppResult<()> {
    if price < Decimal::ZERO {
        return Err(AppError::BadRequest("price cannot be negative".into()));
    }
    if discount_price.is_some_and(|d| d < Decimal::ZERO) {
        return Err(AppError::BadRequest("discount_price cannot be negative".into()));
    }
    Ok(())
}

fn validate_slug(raw: &str) -> AppResult<String> {
    let slug = raw.trim().to_lowercase();
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::BadRequest(
            "slug may only contain letters, numbers, hyphens and underscores".into(),
        ));
    }
    Ok(slug)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn average(sum: i64, count: i64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}

fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        slug: model.slug,
        description: model.description,
        image: model.image,
    }
}

fn image_from_entity(model: ImageModel) -> ProductImage {
    ProductImage {
        id: model.id,
        image: model.image,
        is_primary: model.is_primary,
    }
}

fn product_from_entity(
    model: ProductModel,
    category_name: String,
    images: Vec<ProductImage>,
    average_rating: f64,
) -> Product {
    Product {
        id: model.id,
        name: model.name,
        slug: model.slug,
        category: model.category_id,
        category_name,
        description: model.description,
        current_price: current_price(model.price, model.discount_price),
        discount_percent: discount_percent(model.price, model.discount_price),
        price: model.price,
        discount_price: model.discount_price,
        stock: model.stock,
        is_available: model.is_available,
        is_featured: model.is_featured,
        created_at: model.created_at.with_timezone(&Utc),
        images,
        average_rating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercased_and_checked() {
        assert_eq!(validate_slug(" Ferris-Mug ").ok(), Some("ferris-mug".to_string()));
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }

    #[test]
    fn average_rating_of_nothing_is_zero() {
        assert_eq!(average(0, 0), 0.0);
        assert_eq!(average(9, 2), 4.5);
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(validate_prices(Decimal::NEGATIVE_ONE, None).is_err());
        assert!(validate_prices(Decimal::ONE, Some(Decimal::NEGATIVE_ONE)).is_err());
        assert!(validate_prices(Decimal::ONE, None).is_ok());
    }
}

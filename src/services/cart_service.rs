use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{LockType, OnConflict};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemList, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem},
    pricing::{check_quantity, current_price, line_total},
    response::{ApiResponse, Meta},
    services::product_service::hydrate_products,
    state::AppState,
};

/// The user's cart, created on first access.
pub(crate) async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<CartModel> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(cart);
    }

    let active = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: NotSet,
        updated_at: NotSet,
    };
    // A concurrent first access may have created it already.
    match Carts::insert(active)
        .on_conflict(OnConflict::column(CartCol::UserId).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await
    {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(err.into()),
    }

    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart vanished after insert")))
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let items = load_items(&state.orm, cart.id).await?;

    let mut total_price = Decimal::ZERO;
    let mut total_items: i64 = 0;
    for item in &items {
        total_price += item.total_price;
        total_items += i64::from(item.quantity);
    }

    Ok(ApiResponse::success(
        "OK",
        Cart {
            id: cart.id,
            items,
            total_price,
            total_items,
            updated_at: cart.updated_at.with_timezone(&Utc),
        },
        Some(Meta::empty()),
    ))
}

/// Idempotent: an empty cart stays empty.
pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let result = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;
    touch_cart(&state.orm, cart).await?;

    tracing::debug!(user_id = %user.user_id, removed = result.rows_affected, "cart cleared");
    Ok(ApiResponse::success(
        "Cart cleared successfully",
        serde_json::json!({ "removed": result.rows_affected }),
        Some(Meta::empty()),
    ))
}

pub async fn list_items(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartItemList>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let items = load_items(&state.orm, cart.id).await?;
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "OK",
        CartItemList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let item = find_item(&state.orm, cart.id, id).await?;
    let item = hydrate_item(&state.orm, item).await?;
    Ok(ApiResponse::success("OK", item, None))
}

/// Adding a product already in the cart accumulates its quantity on the same row.
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    check_quantity(payload.quantity)?;
    let unit_price = product_unit_price(&state.orm, payload.product_id).await?;

    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let txn = state.orm.begin().await?;

    // Serializes concurrent adds and checkouts on the same cart.
    let cart = Carts::find_by_id(cart.id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let exist = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&txn)
        .await?;

    let cart_item = if let Some(item) = exist {
        let quantity = item
            .quantity
            .checked_add(payload.quantity)
            .ok_or(AppError::InvalidQuantity)?;
        check_quantity(quantity)?;
        line_total(unit_price, quantity)?;
        let mut active: CartItemActive = item.into();
        active.quantity = Set(quantity);
        active.update(&txn).await?
    } else {
        line_total(unit_price, payload.quantity)?;
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(payload.product_id),
            quantity: Set(payload.quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?
    };
    touch_cart(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": cart_item.quantity }),
    )
    .await;

    let item = hydrate_item(&state.orm, cart_item).await?;
    Ok(ApiResponse::success("OK", item, Some(Meta::empty())))
}

pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    check_quantity(payload.quantity)?;
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let item = find_item(&state.orm, cart.id, id).await?;
    let unit_price = product_unit_price(&state.orm, item.product_id).await?;
    line_total(unit_price, payload.quantity)?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    let item = active.update(&state.orm).await?;
    touch_cart(&state.orm, cart).await?;

    let item = hydrate_item(&state.orm, item).await?;
    Ok(ApiResponse::success("Updated", item, Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let result = CartItems::delete_many()
        .filter(CartItemCol::Id.eq(id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    touch_cart(&state.orm, cart).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "cart_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn product_unit_price<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<Decimal> {
    let product = Products::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(AppError::ProductNotFound)?;
    Ok(current_price(product.price, product.discount_price))
}

async fn find_item<C: ConnectionTrait>(conn: &C, cart_id: Uuid, id: Uuid) -> AppResult<CartItemModel> {
    CartItems::find()
        .filter(CartItemCol::Id.eq(id))
        .filter(CartItemCol::CartId.eq(cart_id))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn touch_cart<C: ConnectionTrait>(conn: &C, cart: CartModel) -> AppResult<()> {
    let mut active: CartActive = cart.into();
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

async fn load_items<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(conn)
        .await?;
    hydrate_items(conn, rows).await
}

async fn hydrate_item<C: ConnectionTrait>(conn: &C, item: CartItemModel) -> AppResult<CartItem> {
    hydrate_items(conn, vec![item])
        .await?
        .pop()
        .ok_or(AppError::ProductNotFound)
}

async fn hydrate_items<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<CartItemModel>,
) -> AppResult<Vec<CartItem>> {
    let product_ids: Vec<Uuid> = rows.iter().map(|r| r.product_id).collect();
    let product_models = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(conn)
        .await?;
    let mut products: HashMap<Uuid, _> = hydrate_products(conn, product_models)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        // Cascading deletes remove lines whose product is gone.
        let Some(product) = products.remove(&row.product_id) else {
            continue;
        };
        let total_price = line_total(product.current_price, row.quantity)?;
        items.push(CartItem {
            id: row.id,
            product,
            quantity: row.quantity,
            total_price,
        });
    }
    Ok(items)
}

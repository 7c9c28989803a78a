use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
    entity::addresses::{
        ActiveModel as AddressActive, Column as AddressCol, Entity as Addresses,
        Model as AddressModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    state::AppState,
    status::AddressType,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items: Vec<Address> = Addresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::IsDefault)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(address_from_entity)
        .collect::<AppResult<_>>()?;

    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Addresses",
        AddressList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let address = find_owned(state, user, id).await?;
    Ok(ApiResponse::success("Address", address_from_entity(address)?, None))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let txn = state.orm.begin().await?;
    if payload.is_default {
        clear_default(&txn, user.user_id, payload.address_type).await?;
    }

    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        address_type: Set(payload.address_type.as_str().to_string()),
        street_address: Set(payload.street_address),
        apartment_address: Set(payload.apartment_address),
        city: Set(payload.city),
        state: Set(payload.state),
        country: Set(payload.country),
        postal_code: Set(payload.postal_code),
        is_default: Set(payload.is_default),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Address created",
        address_from_entity(address)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let existing = find_owned(state, user, id).await?;
    let address_type = match payload.address_type {
        Some(t) => t,
        None => existing.address_type.parse::<AddressType>()?,
    };

    let txn = state.orm.begin().await?;
    if payload.is_default == Some(true) {
        clear_default(&txn, existing.user_id, address_type).await?;
    }

    let mut active: AddressActive = existing.into();
    active.address_type = Set(address_type.as_str().to_string());
    if let Some(street) = payload.street_address {
        active.street_address = Set(street);
    }
    if let Some(apartment) = payload.apartment_address {
        active.apartment_address = Set(Some(apartment));
    }
    if let Some(city) = payload.city {
        active.city = Set(city);
    }
    if let Some(region) = payload.state {
        active.state = Set(region);
    }
    if let Some(country) = payload.country {
        active.country = Set(country);
    }
    if let Some(postal_code) = payload.postal_code {
        active.postal_code = Set(postal_code);
    }
    if let Some(is_default) = payload.is_default {
        active.is_default = Set(is_default);
    }
    let address = active.update(&txn).await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Updated",
        address_from_entity(address)?,
        Some(Meta::empty()),
    ))
}

/// Orders that referenced the address keep their snapshot; the FK is set to null.
pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_owned(state, user, id).await?;
    Addresses::delete_by_id(existing.id).exec(&state.orm).await?;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Address lookup scoped to the caller, staff included. Foreign addresses read as missing.
async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<AddressModel> {
    Addresses::find()
        .filter(AddressCol::Id.eq(id))
        .filter(AddressCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

// One default per user and type.
async fn clear_default<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    address_type: AddressType,
) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(AddressCol::IsDefault, Expr::value(false))
        .filter(AddressCol::UserId.eq(user_id))
        .filter(AddressCol::AddressType.eq(address_type.as_str()))
        .exec(conn)
        .await?;
    Ok(())
}

pub(crate) fn address_from_entity(model: AddressModel) -> AppResult<Address> {
    Ok(Address {
        id: model.id,
        address_type: model.address_type.parse()?,
        street_address: model.street_address,
        apartment_address: model.apartment_address,
        city: model.city,
        state: model.state,
        country: model.country,
        postal_code: model.postal_code,
        is_default: model.is_default,
    })
}

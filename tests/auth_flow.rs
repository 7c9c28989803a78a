mod common;

use rust_decimal::Decimal;
use storefront_api::{
    dto::{
        addresses::UpdateAddressRequest,
        auth::{LoginRequest, RefreshRequest, RegisterRequest, UpdateProfileRequest},
    },
    error::AppError,
    middleware::auth::AuthUser,
    services::{address_service, auth_service, cart_service},
    status::AddressType,
};

use common::{create_address, create_user, setup_state, unique};

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: Some(email.to_string()),
        password: Some("correct horse battery".into()),
        first_name: Some("Test".into()),
        last_name: Some("Customer".into()),
        phone_number: None,
    }
}

// Registration, tokens and the profile endpoints.
#[tokio::test]
async fn register_login_refresh_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let email = format!("{}@example.com", unique("test"));
    let user = auth_service::register_user(&state, register_request(&email))
        .await?
        .data
        .expect("user");
    assert_eq!(user.email, email);
    assert!(!user.is_staff);

    // Same email, different case, is still a duplicate.
    let again = auth_service::register_user(&state, register_request(&email.to_uppercase())).await;
    assert!(matches!(again, Err(AppError::EmailTaken)));

    let missing_password = auth_service::register_user(
        &state,
        RegisterRequest {
            password: None,
            ..register_request(&format!("{}@example.com", unique("other")))
        },
    )
    .await;
    assert!(matches!(missing_password, Err(AppError::BadRequest(_))));

    let wrong = auth_service::login_user(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "wrong".into(),
        },
    )
    .await;
    assert!(matches!(wrong, Err(AppError::Unauthorized(_))));

    let tokens = auth_service::login_user(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "correct horse battery".into(),
        },
    )
    .await?
    .data
    .expect("tokens");

    let refreshed = auth_service::refresh_token(
        &state,
        RefreshRequest {
            refresh: tokens.refresh.clone(),
        },
    )
    .await?;
    assert!(refreshed.data.is_some());

    let with_access = auth_service::refresh_token(
        &state,
        RefreshRequest {
            refresh: tokens.access.clone(),
        },
    )
    .await;
    assert!(matches!(with_access, Err(AppError::Unauthorized(_))));

    // Registration creates the cart up front.
    let auth = AuthUser {
        user_id: user.id,
        is_staff: false,
    };
    let cart = cart_service::get_cart(&state, &auth).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_items, 0);
    assert_eq!(cart.total_price, Decimal::ZERO);

    let updated = auth_service::update_profile(
        &state,
        &auth,
        UpdateProfileRequest {
            first_name: Some("Renamed".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("user");
    assert_eq!(updated.first_name, "Renamed");

    let profile = auth_service::get_profile(&state, &auth).await?.data.expect("user");
    assert_eq!(profile.first_name, "Renamed");

    Ok(())
}

// Addresses are private to their owner, staff included.
#[tokio::test]
async fn addresses_are_scoped_to_their_owner() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let owner = create_user(&state, false).await?;
    let admin = create_user(&state, true).await?;

    let first = create_address(&state, &owner, AddressType::Shipping).await?;
    let second = create_address(&state, &owner, AddressType::Shipping).await?;

    let list = address_service::list_addresses(&state, &owner)
        .await?
        .data
        .expect("addresses");
    assert_eq!(list.items.len(), 2);
    let defaults: Vec<_> = list.items.iter().filter(|a| a.is_default).collect();
    assert_eq!(defaults.len(), 1, "one default per user and type");
    assert_eq!(defaults[0].id, second);

    let peek = address_service::get_address(&state, &admin, first).await;
    assert!(matches!(peek, Err(AppError::NotFound)));

    let updated = address_service::update_address(
        &state,
        &owner,
        first,
        UpdateAddressRequest {
            city: Some("Shelbyville".into()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("address");
    assert_eq!(updated.city, "Shelbyville");

    address_service::delete_address(&state, &owner, first).await?;
    let gone = address_service::get_address(&state, &owner, first).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    Ok(())
}

// Both registrations pass the email pre-check; the unique index decides the loser.
#[tokio::test]
async fn concurrent_registrations_report_email_taken() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let email = format!("{}@example.com", unique("race"));
    let (first, second) = tokio::join!(
        auth_service::register_user(&state, register_request(&email)),
        auth_service::register_user(&state, register_request(&email)),
    );

    let results = [first, second];
    let created = results.iter().filter(|r| r.is_ok()).count();
    let taken = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::EmailTaken)))
        .count();
    assert_eq!(created, 1);
    assert_eq!(taken, 1);

    Ok(())
}

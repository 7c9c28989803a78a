mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{Value, json};
use storefront_api::{
    dto::auth::TokenType,
    entity::users::{ActiveModel as UserActive, Entity as Users},
    middleware::auth::AuthUser,
    routes::create_api_router,
    services::auth_service,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

use common::{create_user, setup_state, unique};

fn app(state: &AppState) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .with_state(state.clone())
}

fn bearer(state: &AppState, user: &AuthUser) -> anyhow::Result<String> {
    let token = auth_service::issue_token(&state.config, user.user_id, user.is_staff, TokenType::Access)?;
    Ok(format!("Bearer {token}"))
}

async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, token);
    }
    let response = app(state)
        .oneshot(request.body(Body::from(body.to_string()))?)
        .await?;

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, json))
}

// Status codes and error bodies as an HTTP client sees them.
#[tokio::test]
async fn http_status_codes_and_error_bodies() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let email = format!("{}@example.com", unique("http"));
    let register = json!({ "email": email, "password": "correct horse battery" });

    let (status, body) = send(&state, "POST", "/api/auth/register", None, register.clone()).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["email"], email.as_str());

    let (status, body) = send(&state, "POST", "/api/auth/register", None, register).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Missing fields are validation errors with the usual JSON body.
    let (status, body) = send(&state, "POST", "/api/auth/login", None, json!({ "email": email })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("password"));

    let user = create_user(&state, false).await?;
    let token = bearer(&state, &user)?;
    let (status, body) = send(
        &state,
        "POST",
        "/api/orders",
        Some(&token),
        json!({ "billing_address_id": Uuid::new_v4() }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("shipping_address_id")
    );

    let (status, body) = send(&state, "GET", "/api/orders/not-a-uuid", Some(&token), Value::Null).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(&state, "GET", "/api/orders", None, Value::Null).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

// A deactivated account loses access before its token expires.
#[tokio::test]
async fn deactivated_user_token_is_rejected() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let user = create_user(&state, false).await?;
    let token = bearer(&state, &user)?;

    let (status, _) = send(&state, "GET", "/api/cart", Some(&token), Value::Null).await?;
    assert_eq!(status, StatusCode::OK);

    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .expect("user");
    let mut active: UserActive = model.into();
    active.is_active = Set(false);
    active.update(&state.orm).await?;

    let (status, body) = send(&state, "GET", "/api/cart", Some(&token), Value::Null).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    Ok(())
}

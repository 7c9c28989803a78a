use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{
        AccessToken, Claims, LoginRequest, RefreshRequest, RegisterRequest, TokenPair, TokenType,
        UpdateProfileRequest,
    },
    entity::{
        carts::ActiveModel as CartActive,
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, decode_claims},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let email = payload
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email is required when creating a user".into()))?;
    validate_email(&email)?;
    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Password is required when creating a user".into()))?;

    let txn = state.orm.begin().await?;

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&txn)
        .await?;
    if exist.is_some() {
        return Err(AppError::EmailTaken);
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&password)?),
        first_name: Set(payload.first_name.unwrap_or_default()),
        last_name: Set(payload.last_name.unwrap_or_default()),
        phone_number: Set(payload.phone_number),
        is_active: Set(true),
        is_staff: Set(false),
        date_joined: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(email_conflict)?;

    CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(user_id = %user.id, "user registered");
    audit::record(
        &state.pool,
        user.id,
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", user_from_entity(user), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<TokenPair>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(&email)))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid email or password".into())),
    };

    verify_password(&password, &user.password_hash)?;

    if !user.is_active {
        return Err(AppError::Unauthorized("Account is disabled".into()));
    }

    let pair = TokenPair {
        access: issue_token(&state.config, user.id, user.is_staff, TokenType::Access)?,
        refresh: issue_token(&state.config, user.id, user.is_staff, TokenType::Refresh)?,
    };

    audit::record(
        &state.pool,
        user.id,
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Logged in", pair, Some(Meta::empty())))
}

pub async fn refresh_token(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<AccessToken>> {
    let claims = decode_claims(&state.config.jwt_secret, &payload.refresh, TokenType::Refresh)?;
    let auth = AuthUser::try_from(claims)?;

    // Staff flag and active state are re-read so a demoted user loses access on refresh.
    let user = Users::find_by_id(auth.user_id)
        .one(&state.orm)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User no longer active".into()))?;

    let access = issue_token(&state.config, user.id, user.is_staff, TokenType::Access)?;
    Ok(ApiResponse::success(
        "Token refreshed",
        AccessToken { access },
        Some(Meta::empty()),
    ))
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Profile", user_from_entity(model), None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();

    if let Some(email) = payload.email.as_deref().map(normalize_email) {
        validate_email(&email)?;
        let taken = Users::find()
            .filter(UserCol::Email.eq(email.as_str()))
            .filter(UserCol::Id.ne(user.user_id))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::EmailTaken);
        }
        active.email = Set(email);
    }
    if let Some(password) = payload.password.filter(|p| !p.is_empty()) {
        active.password_hash = Set(hash_password(&password)?);
    }
    if let Some(first_name) = payload.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(last_name);
    }
    if let Some(phone_number) = payload.phone_number {
        active.phone_number = Set(Some(phone_number));
    }

    let updated = active.update(&state.orm).await.map_err(email_conflict)?;

    audit::record(
        &state.pool,
        user.user_id,
        "profile_update",
        "users",
        serde_json::json!({ "user_id": updated.id }),
    )
    .await;

    Ok(ApiResponse::success("Updated", user_from_entity(updated), Some(Meta::empty())))
}

pub fn issue_token(
    config: &AppConfig,
    user_id: Uuid,
    is_staff: bool,
    token_type: TokenType,
) -> AppResult<String> {
    let ttl = match token_type {
        TokenType::Access => Duration::minutes(config.access_token_ttl_minutes),
        TokenType::Refresh => Duration::days(config.refresh_token_ttl_days),
    };
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: AuthUser { user_id, is_staff }.role().to_string(),
        token_type,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// The email pre-check can race; the unique index settles it.
fn email_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::EmailTaken,
        _ => err.into(),
    }
}

fn verify_password(password: &str, stored_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".into()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::BadRequest("Enter a valid email address".into())),
    }
}

pub(crate) fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        first_name: model.first_name,
        last_name: model.last_name,
        phone_number: model.phone_number,
        is_staff: model.is_staff,
        date_joined: model.date_joined.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::for_database("postgres://unused", "test-secret")
    }

    #[test]
    fn access_token_round_trips_through_extractor_rules() {
        let config = config();
        let user_id = Uuid::new_v4();
        let token = issue_token(&config, user_id, true, TokenType::Access).expect("token");

        let claims = decode_claims(&config.jwt_secret, &token, TokenType::Access).expect("claims");
        let auth = AuthUser::try_from(claims).expect("auth user");
        assert_eq!(auth.user_id, user_id);
        assert!(auth.is_staff);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = config();
        let token = issue_token(&config, Uuid::new_v4(), false, TokenType::Refresh).expect("token");

        assert!(matches!(
            decode_claims(&config.jwt_secret, &token, TokenType::Access),
            Err(AppError::Unauthorized(_))
        ));
        assert!(decode_claims(&config.jwt_secret, &token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(&config(), Uuid::new_v4(), false, TokenType::Access).expect("token");
        assert!(decode_claims("another-secret", &token, TokenType::Access).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret-pass").expect("hash");
        assert!(verify_password("s3cret-pass", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn email_checks() {
        assert_eq!(normalize_email("  Test@Example.com "), "test@example.com");
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
    }
}

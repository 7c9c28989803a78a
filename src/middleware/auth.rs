use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::{EntityTrait, QuerySelect};
use uuid::Uuid;

use crate::{
    dto::auth::{Claims, TokenType},
    entity::{
        orders, reviews,
        users::{Column as UserCol, Entity as Users},
    },
    error::AppError,
    state::AppState,
};

pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub is_staff: bool,
}

impl AuthUser {
    pub fn role(&self) -> &'static str {
        if self.is_staff { ADMIN_ROLE } else { USER_ROLE }
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if !user.is_staff {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// A resource that belongs to exactly one user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

impl Owned for orders::Model {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

impl Owned for reviews::Model {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

pub fn ensure_owner_or_admin<R: Owned>(user: &AuthUser, resource: &R) -> Result<(), AppError> {
    if user.is_staff || resource.owner_id() == user.user_id {
        return Ok(());
    }
    Err(AppError::Forbidden)
}

pub fn decode_claims(secret: &str, token: &str, expected: TokenType) -> Result<Claims, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    if decoded.claims.token_type != expected {
        return Err(AppError::Unauthorized("Wrong token type".into()));
    }
    Ok(decoded.claims)
}

impl TryFrom<Claims> for AuthUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
        Ok(AuthUser {
            user_id,
            is_staff: claims.role == ADMIN_ROLE,
        })
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;

        let claims = decode_claims(&state.config.jwt_secret, token, TokenType::Access)?;
        let user = AuthUser::try_from(claims)?;

        // Deactivation applies to tokens already issued.
        let active = Users::find_by_id(user.user_id)
            .select_only()
            .column(UserCol::IsActive)
            .into_tuple::<bool>()
            .one(&state.orm)
            .await?;
        if active != Some(true) {
            return Err(AppError::Unauthorized("User no longer active".into()));
        }
        Ok(user)
    }
}

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    dto::products::{CreateReviewRequest, ReviewList, UpdateReviewRequest},
    entity::{
        products::{Column as ProductCol, Entity as Products},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews, Model as ReviewModel},
        users::{Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_owner_or_admin},
    models::Review,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_product_reviews(
    state: &AppState,
    slug: &str,
) -> AppResult<ApiResponse<ReviewList>> {
    let product_id = product_id_by_slug(state, slug).await?;
    let reviews = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt)
        .all(&state.orm)
        .await?;
    respond_with_list(state, reviews).await
}

/// Staff see every review, everyone else only their own.
pub async fn list_reviews(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<ReviewList>> {
    let mut finder = Reviews::find().order_by_desc(ReviewCol::CreatedAt);
    if !user.is_staff {
        finder = finder.filter(ReviewCol::UserId.eq(user.user_id));
    }
    let reviews = finder.all(&state.orm).await?;
    respond_with_list(state, reviews).await
}

pub async fn get_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Review>> {
    let review = find_review(state, id).await?;
    ensure_owner_or_admin(user, &review)?;
    let author = load_author(state, review.user_id).await?;
    Ok(ApiResponse::success("Review", review_from_entity(review, &author), None))
}

pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    slug: &str,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_rating(payload.rating)?;
    let product_id = product_id_by_slug(state, slug).await?;

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        user_id: Set(user.user_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let author = load_author(state, user.user_id).await?;
    Ok(ApiResponse::success(
        "Review created",
        review_from_entity(review, &author),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let existing = find_review(state, id).await?;
    ensure_owner_or_admin(user, &existing)?;

    let mut active: ReviewActive = existing.into();
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
        active.rating = Set(rating);
    }
    if let Some(comment) = payload.comment {
        active.comment = Set(comment);
    }
    let review = active.update(&state.orm).await?;

    let author = load_author(state, review.user_id).await?;
    Ok(ApiResponse::success(
        "Updated",
        review_from_entity(review, &author),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_review(state, id).await?;
    ensure_owner_or_admin(user, &existing)?;
    Reviews::delete_by_id(existing.id).exec(&state.orm).await?;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn respond_with_list(
    state: &AppState,
    reviews: Vec<ReviewModel>,
) -> AppResult<ApiResponse<ReviewList>> {
    let user_ids: Vec<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let authors: HashMap<Uuid, UserModel> = Users::find()
        .filter(UserCol::Id.is_in(user_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let items: Vec<Review> = reviews
        .into_iter()
        .filter_map(|review| {
            let author = authors.get(&review.user_id)?;
            Some(review_from_entity(review, author))
        })
        .collect();
    let total = items.len() as i64;

    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::new(1, total, total)),
    ))
}

async fn product_id_by_slug(state: &AppState, slug: &str) -> AppResult<Uuid> {
    Products::find()
        .filter(ProductCol::Slug.eq(slug))
        .select_only()
        .column(ProductCol::Id)
        .into_tuple::<Uuid>()
        .one(&state.orm)
        .await?
        .ok_or(AppError::ProductNotFound)
}

async fn find_review(state: &AppState, id: Uuid) -> AppResult<ReviewModel> {
    Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn load_author(state: &AppState, user_id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

fn validate_rating(rating: i32) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    Ok(())
}

fn review_from_entity(model: ReviewModel, author: &UserModel) -> Review {
    Review {
        id: model.id,
        product: model.product_id,
        user: model.user_id,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
        user_email: author.email.clone(),
        user_name: author.full_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::validate_rating;

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }
}

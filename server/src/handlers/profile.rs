use axum::{extract::State, response::IntoResponse, response::Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ValidJson;
use crate::auth::AuthUser;
use crate::models::{ProfileResponse, ProfileUpdate};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 100, message = "must be 2 to 100 characters"))]
    pub name: String,
    #[validate(length(max = 20, message = "must be at most 20 characters"))]
    pub phone: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub avatar_url: Option<String>,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    pub amount: Decimal,
}

#[derive(Serialize)]
struct BalancePayload {
    balance: Decimal,
}

fn user_gone() -> AppError {
    AppError::NotFound("User not found".to_string())
}

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(user_gone)?;

    Ok(success(ProfileResponse::from(&user), "Profile retrieved").into_response())
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(body): ValidJson<UpdateProfileRequest>,
) -> Result<Response, AppError> {
    let update = ProfileUpdate {
        name: body.name.trim().to_string(),
        phone: body.phone,
        avatar_url: body.avatar_url,
        bio: body.bio,
    };
    let user = state
        .store
        .update_profile(auth.user_id, update)
        .await?
        .ok_or_else(user_gone)?;

    Ok(success(ProfileResponse::from(&user), "Profile updated").into_response())
}

pub async fn top_up_balance(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(body): ValidJson<TopUpRequest>,
) -> Result<Response, AppError> {
    let balance = state
        .bookings
        .top_up_balance(auth.user_id, body.amount)
        .await?;

    Ok(success(BalancePayload { balance }, "Balance updated").into_response())
}

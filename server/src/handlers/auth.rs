use axum::{extract::State, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};
use tokio::task;
use validator::Validate;

use super::ValidJson;
use crate::auth::{hash_password, verify_password};
use crate::models::{NewUser, UserResponse};
use crate::state::AppState;
use crate::storage::StoreError;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 2, max = 100, message = "must be 2 to 100 characters"))]
    pub name: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Serialize)]
struct AuthPayload {
    user: UserResponse,
    token: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<RegisterRequest>,
) -> Result<Response, AppError> {
    let cost = state.bcrypt_cost;
    let password = body.password;
    let password_hash = task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|err| AppError::InternalServerError(err.to_string()))??;

    let user = state
        .store
        .create_user(NewUser {
            email: normalize_email(&body.email),
            name: body.name.trim().to_string(),
            password_hash,
        })
        .await
        .map_err(|err| match err {
            StoreError::UniqueViolation(_) => {
                AppError::Conflict("An account with this email already exists".to_string())
            }
            other => other.into(),
        })?;

    let token = state.jwt.issue(user.id, &user.email)?;
    tracing::info!(user_id = %user.id, "user registered");

    let payload = AuthPayload {
        user: UserResponse::from(&user),
        token,
    };
    Ok(created(payload, "Registration successful").into_response())
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<LoginRequest>,
) -> Result<Response, AppError> {
    let user = state
        .store
        .find_user_by_email(&normalize_email(&body.email))
        .await?
        .ok_or_else(|| AppError::AuthError(INVALID_CREDENTIALS.to_string()))?;

    let password = body.password;
    let hash = user.password_hash.clone();
    let valid = task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| AppError::InternalServerError(err.to_string()))?;
    if !valid {
        return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
    }

    let token = state.jwt.issue(user.id, &user.email)?;
    tracing::info!(user_id = %user.id, "user logged in");

    let payload = AuthPayload {
        user: UserResponse::from(&user),
        token,
    };
    Ok(success(payload, "Login successful").into_response())
}

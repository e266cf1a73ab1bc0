use axum::{extract::State, response::IntoResponse, response::Response};
use uuid::Uuid;

use super::ApiPath;
use crate::auth::AuthUser;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn list_bookings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    let bookings = state.store.list_bookings(auth.user_id).await?;
    Ok(success(bookings, "Bookings retrieved").into_response())
}

pub async fn get_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let booking = state
        .store
        .find_booking(booking_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    Ok(success(booking, "Booking retrieved").into_response())
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let booking = state
        .bookings
        .cancel_booking(booking_id, auth.user_id)
        .await?;

    Ok(success(booking, "Booking cancelled").into_response())
}

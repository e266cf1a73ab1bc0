use axum::{extract::State, response::IntoResponse, response::Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{ApiPath, ApiQuery, ValidJson};
use crate::auth::AuthUser;
use crate::models::{is_money, EventCategory, EventFilter, NewEvent, MAX_MONEY};
use crate::services::search::{self, page};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 3, max = 200, message = "must be 3 to 200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "must be at most 2000 characters"))]
    pub description: String,
    pub category: EventCategory,
    #[validate(url(message = "must be a valid URL"))]
    pub image_url: Option<String>,
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub venue: String,
    #[validate(length(min = 1, max = 300, message = "is required"))]
    pub address: String,
    pub price: Decimal,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub capacity: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePriceRequest {
    pub price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookRequest {
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn check_price(price: Decimal) -> Result<(), AppError> {
    if !is_money(price) {
        return Err(AppError::ValidationError(format!(
            "price must be between 0 and {MAX_MONEY} with at most two decimal places"
        )));
    }
    Ok(())
}

pub async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(body): ValidJson<CreateEventRequest>,
) -> Result<Response, AppError> {
    check_price(body.price)?;
    if body.end_time <= body.start_time {
        return Err(AppError::ValidationError(
            "end_time must be after start_time".to_string(),
        ));
    }
    if body.start_time <= Utc::now() {
        return Err(AppError::ValidationError(
            "start_time must be in the future".to_string(),
        ));
    }

    let event = state
        .store
        .create_event(NewEvent {
            title: body.title.trim().to_string(),
            description: body.description,
            category: body.category,
            image_url: body.image_url,
            venue: body.venue,
            address: body.address,
            price: body.price,
            capacity: body.capacity,
            start_time: body.start_time,
            end_time: body.end_time,
            creator_id: auth.user_id,
        })
        .await?;

    tracing::info!(event_id = %event.id, creator_id = %auth.user_id, "event created");
    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Response, AppError> {
    let results = search::search(
        state.store.as_ref(),
        &EventFilter::default(),
        page(params.limit, params.offset),
    )
    .await?;

    Ok(success(results, "Events retrieved").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let event = state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    Ok(success(event, "Event retrieved").into_response())
}

/// Only the creator may reprice; everyone else gets the same 404 as for a
/// missing event.
pub async fn update_price(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ValidJson(body): ValidJson<UpdatePriceRequest>,
) -> Result<Response, AppError> {
    check_price(body.price)?;

    let event = state
        .store
        .update_event_price(event_id, auth.user_id, body.price)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    tracing::info!(%event_id, price = %event.price, "event repriced");
    Ok(success(event, "Event price updated").into_response())
}

pub async fn book_event(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(event_id): ApiPath<Uuid>,
    ValidJson(body): ValidJson<BookRequest>,
) -> Result<Response, AppError> {
    let booking = state
        .bookings
        .create_booking(auth.user_id, event_id, body.quantity)
        .await?;

    Ok(created(booking, "Booking confirmed").into_response())
}

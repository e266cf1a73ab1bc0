use axum::{extract::State, response::IntoResponse, response::Response};
use serde::Serialize;

use crate::state::AppState;
use crate::utils::response::success;

pub mod auth;
pub mod bookings;
pub mod events;
mod extract;
pub mod profile;
pub mod search;

pub use extract::{ApiPath, ApiQuery, ValidJson};

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
    database: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let database = match state.store.ping().await {
        Ok(()) => "up",
        Err(err) => {
            tracing::warn!(error = %err, "Health check could not reach the database");
            "down"
        }
    };

    let payload = HealthPayload {
        status: "ok",
        service: "eventbook-api",
        database,
    };

    success(payload, "Health check successful").into_response()
}

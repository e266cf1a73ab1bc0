use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{auth, bookings, events, health_check, profile, search};
use crate::state::AppState;

/// HTTP-facing settings that shape the middleware stack.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub production: bool,
    pub cors_allowed_origins: Option<String>,
}

impl From<&Config> for HttpOptions {
    fn from(config: &Config) -> Self {
        Self {
            production: config.production,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

pub fn create_routes(state: AppState, options: HttpOptions) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/profile/balance", post(profile::top_up_balance))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/price", patch(events::update_price))
        .route("/events/:id/book", post(events::book_event))
        .route("/search", get(search::search_events))
        .route("/bookings", get(bookings::list_bookings))
        .route(
            "/bookings/:id",
            get(bookings::get_booking).delete(bookings::cancel_booking),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(options.production))
        .layer(create_cors_layer(options.cors_allowed_origins.as_deref()))
}

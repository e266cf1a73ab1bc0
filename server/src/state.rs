use std::sync::Arc;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::services::BookingManager;
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub bookings: BookingManager,
    pub jwt: Arc<JwtManager>,
    pub bcrypt_cost: u32,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt: JwtManager, bcrypt_cost: u32, max_tickets: i32) -> Self {
        Self {
            bookings: BookingManager::new(Arc::clone(&store), max_tickets),
            store,
            jwt: Arc::new(jwt),
            bcrypt_cost,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &Config) -> Self {
        Self::new(
            store,
            JwtManager::new(&config.jwt_secret, config.jwt_ttl_secs),
            config.bcrypt_cost,
            config.max_tickets_per_booking,
        )
    }
}

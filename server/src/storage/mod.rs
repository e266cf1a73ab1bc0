//! Persistence seam.
//!
//! Handlers and the booking transaction manager only ever see [`Store`] and
//! [`StoreTx`]. [`PgStore`] is the production backend; [`MemoryStore`] keeps
//! everything in process and is used by tests and local runs.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, BookingWithEvent, Event, EventFilter, EventStock, NewBooking,
    NewEvent, NewUser, Page, ProfileUpdate, User, UserFunds,
};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>>;

    async fn create_event(&self, event: NewEvent) -> StoreResult<Event>;
    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    /// Changes the price of an event owned by `creator_id`. Existing
    /// bookings keep their frozen totals.
    async fn update_event_price(
        &self,
        id: Uuid,
        creator_id: Uuid,
        price: Decimal,
    ) -> StoreResult<Option<Event>>;
    /// Returns one page of matches plus the total match count.
    async fn search_events(&self, filter: &EventFilter, page: Page)
        -> StoreResult<(Vec<Event>, i64)>;

    async fn list_bookings(&self, user_id: Uuid) -> StoreResult<Vec<BookingWithEvent>>;
    async fn find_booking(&self, id: Uuid, user_id: Uuid)
        -> StoreResult<Option<BookingWithEvent>>;

    /// Opens an atomic unit. Dropping the returned handle without calling
    /// [`StoreTx::commit`] discards every change made through it.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One open transaction. `lock_*` methods take an exclusive row lock that is
/// held until commit or rollback.
#[async_trait]
pub trait StoreTx: Send {
    async fn lock_event(&mut self, id: Uuid) -> StoreResult<Option<EventStock>>;
    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<UserFunds>>;
    async fn lock_booking(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> StoreResult<()>;
    async fn adjust_available_tickets(&mut self, event_id: Uuid, delta: i32) -> StoreResult<()>;
    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking>;
    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;
}

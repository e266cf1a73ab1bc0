//! In-process backend.
//!
//! One async mutex guards all tables. A transaction holds it from `begin`
//! until commit or drop and works on a private copy, so commit is a single
//! swap and rollback is simply dropping the copy. Coarser than row locks,
//! but it gives the same isolation and the same timeout behaviour.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, StoreTx};
use crate::models::{
    Booking, BookingStatus, BookingWithEvent, Event, EventFilter, EventStock, NewBooking,
    NewEvent, NewUser, Page, ProfileUpdate, User, UserFunds, MAX_MONEY,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
}

impl Tables {
    fn with_event(&self, booking: &Booking) -> StoreResult<BookingWithEvent> {
        let event = self.events.get(&booking.event_id).ok_or_else(|| {
            StoreError::Corrupt(format!("booking {} references missing event", booking.id))
        })?;

        Ok(BookingWithEvent {
            booking: booking.clone(),
            event_title: event.title.clone(),
            event_date: event.start_time,
            venue: event.venue.clone(),
        })
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout,
        }
    }

    async fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        timeout(self.lock_timeout, self.tables.lock())
            .await
            .map_err(|_| StoreError::Busy)
    }

    /// Removes an event row outright. Only exists to reproduce a dangling
    /// booking in tests; the HTTP surface never deletes events.
    pub async fn remove_event(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.lock().await?.events.remove(&id).is_some())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().await.map(|_| ())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.lock().await?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            phone: None,
            avatar_url: None,
            bio: None,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock().await?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.lock().await?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>> {
        let mut tables = self.lock().await?;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };

        user.name = update.name;
        user.phone = update.phone;
        user.avatar_url = update.avatar_url;
        user.bio = update.bio;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut tables = self.lock().await?;
        if !tables.users.contains_key(&event.creator_id) {
            return Err(StoreError::Corrupt(format!(
                "event creator {} does not exist",
                event.creator_id
            )));
        }

        let now = Utc::now();
        let created = Event {
            id: Uuid::new_v4(),
            title: event.title,
            description: event.description,
            category: event.category,
            image_url: event.image_url,
            venue: event.venue,
            address: event.address,
            price: event.price,
            capacity: event.capacity,
            available_tickets: event.capacity,
            start_time: event.start_time,
            end_time: event.end_time,
            creator_id: event.creator_id,
            created_at: now,
            updated_at: now,
        };
        tables.events.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.lock().await?.events.get(&id).cloned())
    }

    async fn update_event_price(
        &self,
        id: Uuid,
        creator_id: Uuid,
        price: Decimal,
    ) -> StoreResult<Option<Event>> {
        let mut tables = self.lock().await?;
        match tables.events.get_mut(&id) {
            Some(event) if event.creator_id == creator_id => {
                event.price = price;
                event.updated_at = Utc::now();
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn search_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> StoreResult<(Vec<Event>, i64)> {
        let tables = self.lock().await?;
        let mut matches: Vec<&Event> = tables.events.values().filter(|e| filter.matches(e)).collect();
        matches.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));

        let total = matches.len() as i64;
        let offset = usize::try_from(page.offset).unwrap_or(0);
        let limit = usize::try_from(page.limit).unwrap_or(0);
        let events = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok((events, total))
    }

    async fn list_bookings(&self, user_id: Uuid) -> StoreResult<Vec<BookingWithEvent>> {
        let tables = self.lock().await?;
        let mut owned: Vec<&Booking> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        owned.into_iter().map(|b| tables.with_event(b)).collect()
    }

    async fn find_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<BookingWithEvent>> {
        let tables = self.lock().await?;
        tables
            .bookings
            .get(&id)
            .filter(|b| b.user_id == user_id)
            .map(|b| tables.with_event(b))
            .transpose()
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = timeout(self.lock_timeout, Arc::clone(&self.tables).lock_owned())
            .await
            .map_err(|_| StoreError::Busy)?;
        let working = guard.clone();

        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
        }))
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
}

impl MemoryTx {
    fn tables(&mut self) -> StoreResult<&mut Tables> {
        if self.guard.is_none() {
            return Err(StoreError::Finished);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_event(&mut self, id: Uuid) -> StoreResult<Option<EventStock>> {
        Ok(self.tables()?.events.get(&id).map(|e| EventStock {
            id: e.id,
            price: e.price,
            capacity: e.capacity,
            available_tickets: e.available_tickets,
        }))
    }

    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<UserFunds>> {
        Ok(self.tables()?.users.get(&id).map(|u| UserFunds {
            id: u.id,
            balance: u.balance,
        }))
    }

    async fn lock_booking(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .tables()?
            .bookings
            .get(&id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> StoreResult<()> {
        let user = self
            .tables()?
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Corrupt(format!("user {user_id} vanished mid-transaction")))?;

        let balance = user
            .balance
            .checked_add(delta)
            .filter(|balance| *balance <= MAX_MONEY)
            .ok_or_else(|| StoreError::OutOfRange("users.balance".to_string()))?;
        if balance < Decimal::ZERO {
            return Err(StoreError::CheckViolation("users_balance_non_negative".to_string()));
        }
        user.balance = balance;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn adjust_available_tickets(&mut self, event_id: Uuid, delta: i32) -> StoreResult<()> {
        let event = self.tables()?.events.get_mut(&event_id).ok_or_else(|| {
            StoreError::Corrupt(format!("event {event_id} vanished mid-transaction"))
        })?;

        let available = event.available_tickets + delta;
        if available < 0 || available > event.capacity {
            return Err(StoreError::CheckViolation("events_inventory_bounds".to_string()));
        }
        event.available_tickets = available;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        let tables = self.tables()?;
        if tables
            .bookings
            .values()
            .any(|b| b.booking_code == booking.booking_code)
        {
            return Err(StoreError::UniqueViolation(
                "bookings_booking_code_key".to_string(),
            ));
        }

        let created = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            event_id: booking.event_id,
            quantity: booking.quantity,
            total_price: booking.total_price,
            status: BookingStatus::Confirmed,
            booking_code: booking.booking_code,
            created_at: Utc::now(),
        };
        tables.bookings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()> {
        if let Some(booking) = self.tables()?.bookings.get_mut(&id) {
            booking.status = status;
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let mut guard = self.guard.take().ok_or(StoreError::Finished)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventCategory;

    async fn seed(store: &MemoryStore) -> (User, Event) {
        let user = store
            .create_user(NewUser {
                email: "owner@example.com".into(),
                name: "Owner".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let start = Utc::now() + chrono::Duration::days(3);
        let event = store
            .create_event(NewEvent {
                title: "Jazz night".into(),
                description: String::new(),
                category: EventCategory::Concert,
                image_url: None,
                venue: "Blue Hall".into(),
                address: "Main street 1".into(),
                price: Decimal::new(100, 0),
                capacity: 10,
                start_time: start,
                end_time: start + chrono::Duration::hours(2),
                creator_id: user.id,
            })
            .await
            .unwrap();
        (user, event)
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = MemoryStore::default();
        seed(&store).await;
        let err = store
            .create_user(NewUser {
                email: "owner@example.com".into(),
                name: "Other".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::default();
        let (user, event) = seed(&store).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.adjust_available_tickets(event.id, -3).await.unwrap();
            tx.adjust_balance(user.id, Decimal::new(50, 0)).await.unwrap();
        }

        let event = store.find_event(event.id).await.unwrap().unwrap();
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(event.available_tickets, 10);
        assert_eq!(user.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::default();
        let (_, event) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.adjust_available_tickets(event.id, -3).await.unwrap();
        tx.commit().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Finished)));
        drop(tx);

        let event = store.find_event(event.id).await.unwrap().unwrap();
        assert_eq!(event.available_tickets, 7);
    }

    #[tokio::test]
    async fn inventory_and_balance_bounds_are_enforced() {
        let store = MemoryStore::default();
        let (user, event) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.adjust_available_tickets(event.id, 1).await,
            Err(StoreError::CheckViolation(_))
        ));
        assert!(matches!(
            tx.adjust_available_tickets(event.id, -11).await,
            Err(StoreError::CheckViolation(_))
        ));
        assert!(matches!(
            tx.adjust_balance(user.id, Decimal::new(-1, 0)).await,
            Err(StoreError::CheckViolation(_))
        ));
        tx.adjust_balance(user.id, MAX_MONEY).await.unwrap();
        assert!(matches!(
            tx.adjust_balance(user.id, Decimal::new(1, 2)).await,
            Err(StoreError::OutOfRange(_))
        ));
        assert!(matches!(
            tx.adjust_balance(user.id, Decimal::MAX).await,
            Err(StoreError::OutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn second_transaction_times_out_while_first_is_open() {
        let store = MemoryStore::new(Duration::from_millis(50));
        let _open = store.begin().await.unwrap();

        assert!(matches!(store.begin().await, Err(StoreError::Busy)));
        assert!(matches!(store.ping().await, Err(StoreError::Busy)));
    }

    #[tokio::test]
    async fn price_update_is_restricted_to_creator() {
        let store = MemoryStore::default();
        let (user, event) = seed(&store).await;

        let stranger = store
            .update_event_price(event.id, Uuid::new_v4(), Decimal::new(1, 0))
            .await
            .unwrap();
        assert!(stranger.is_none());

        let updated = store
            .update_event_price(event.id, user.id, Decimal::new(150, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, Decimal::new(150, 0));
    }
}

//! Postgres backend.
//!
//! Row locks are plain `SELECT ... FOR UPDATE`; every transaction runs with
//! `SET LOCAL lock_timeout` so a contended row surfaces as
//! [`StoreError::Busy`] instead of blocking forever.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, StoreTx};
use crate::models::{
    Booking, BookingStatus, BookingWithEvent, Event, EventFilter, EventStock, NewBooking,
    NewEvent, NewUser, Page, ProfileUpdate, User, UserFunds,
};

const USER_COLUMNS: &str = "id, email, name, password_hash, phone, avatar_url, bio, balance, \
                            created_at, updated_at";

const EVENT_COLUMNS: &str = "id, title, description, category, image_url, venue, address, price, \
                             capacity, available_tickets, start_time, end_time, creator_id, \
                             created_at, updated_at";

const BOOKING_COLUMNS: &str =
    "id, user_id, event_id, quantity, total_price, status, booking_code, created_at";

const BOOKING_WITH_EVENT_SELECT: &str = "SELECT b.id, b.user_id, b.event_id, b.quantity, \
     b.total_price, b.status, b.booking_code, b.created_at, \
     e.title AS event_title, e.start_time AS event_date, e.venue \
     FROM bookings b JOIN events e ON b.event_id = e.id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Opens a pool whose acquire timeout matches the row-lock timeout, so
    /// pool exhaustion and lock contention fail the same way.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(lock_timeout)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, lock_timeout))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    image_url: Option<String>,
    venue: String,
    address: String,
    price: Decimal,
    capacity: i32,
    available_tickets: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    creator_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("event {}: {e}", row.id)))?;

        Ok(Event {
            id: row.id,
            title: row.title,
            description: row.description,
            category,
            image_url: row.image_url,
            venue: row.venue,
            address: row.address,
            price: row.price,
            capacity: row.capacity,
            available_tickets: row.available_tickets,
            start_time: row.start_time,
            end_time: row.end_time,
            creator_id: row.creator_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    quantity: i32,
    total_price: Decimal,
    status: String,
    booking_code: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {e}", row.id)))?;

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            quantity: row.quantity,
            total_price: row.total_price,
            status,
            booking_code: row.booking_code,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct BookingWithEventRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    event_title: String,
    event_date: DateTime<Utc>,
    venue: String,
}

impl TryFrom<BookingWithEventRow> for BookingWithEvent {
    type Error = StoreError;

    fn try_from(row: BookingWithEventRow) -> Result<Self, Self::Error> {
        Ok(BookingWithEvent {
            booking: row.booking.try_into()?,
            event_title: row.event_title,
            event_date: row.event_date,
            venue: row.venue,
        })
    }
}

/// Escapes `LIKE` metacharacters so user input only ever matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    builder.push(" WHERE TRUE");

    if let Some(query) = &filter.query {
        let pattern = like_pattern(query);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR venue ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR address ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = filter.category {
        builder
            .push(" AND category = ")
            .push_bind(category.as_str());
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND start_time >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND start_time <= ").push_bind(to);
    }
    if let Some(min) = filter.price_min {
        builder.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.price_max {
        builder.push(" AND price <= ").push_bind(max);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, name, password_hash, balance) \
             VALUES ($1, $2, $3, $4, 0) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET name = $1, phone = $2, avatar_url = $3, bio = $4, updated_at = NOW() \
             WHERE id = $5 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&update.name)
            .bind(&update.phone)
            .bind(&update.avatar_url)
            .bind(&update.bio)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let sql = format!(
            "INSERT INTO events (id, title, description, category, image_url, venue, address, \
             price, capacity, available_tickets, start_time, end_time, creator_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10, $11, $12) \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.category.as_str())
            .bind(&event.image_url)
            .bind(&event.venue)
            .bind(&event.address)
            .bind(event.price)
            .bind(event.capacity)
            .bind(event.start_time)
            .bind(event.end_time)
            .bind(event.creator_id)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Event::try_from)
            .transpose()
    }

    async fn update_event_price(
        &self,
        id: Uuid,
        creator_id: Uuid,
        price: Decimal,
    ) -> StoreResult<Option<Event>> {
        let sql = format!(
            "UPDATE events SET price = $1, updated_at = NOW() \
             WHERE id = $2 AND creator_id = $3 RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(price)
            .bind(id)
            .bind(creator_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Event::try_from)
            .transpose()
    }

    async fn search_events(
        &self,
        filter: &EventFilter,
        page: Page,
    ) -> StoreResult<(Vec<Event>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM events");
        push_filter(&mut count, filter);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY start_time ASC, id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let events = select
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Event::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((events, total))
    }

    async fn list_bookings(&self, user_id: Uuid) -> StoreResult<Vec<BookingWithEvent>> {
        let sql = format!(
            "{BOOKING_WITH_EVENT_SELECT} WHERE b.user_id = $1 ORDER BY b.created_at DESC, b.id"
        );
        sqlx::query_as::<_, BookingWithEventRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(BookingWithEvent::try_from)
            .collect()
    }

    async fn find_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<BookingWithEvent>> {
        let sql = format!("{BOOKING_WITH_EVENT_SELECT} WHERE b.id = $1 AND b.user_id = $2");
        sqlx::query_as::<_, BookingWithEventRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(BookingWithEvent::try_from)
            .transpose()
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we own.
        let set_timeout = format!("SET LOCAL lock_timeout = {}", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// An open Postgres transaction. sqlx rolls back on drop.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::Finished)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_event(&mut self, id: Uuid) -> StoreResult<Option<EventStock>> {
        let row: Option<(Uuid, Decimal, i32, i32)> = sqlx::query_as(
            "SELECT id, price, capacity, available_tickets FROM events WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;

        Ok(row.map(|(id, price, capacity, available_tickets)| EventStock {
            id,
            price,
            capacity,
            available_tickets,
        }))
    }

    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<UserFunds>> {
        let row: Option<(Uuid, Decimal)> =
            sqlx::query_as("SELECT id, balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(self.conn()?)
                .await?;

        Ok(row.map(|(id, balance)| UserFunds { id, balance }))
    }

    async fn lock_booking(&mut self, id: Uuid, user_id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.conn()?)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Decimal) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET balance = balance + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(delta)
        .bind(user_id)
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("user {user_id} vanished mid-transaction")));
        }
        Ok(())
    }

    async fn adjust_available_tickets(&mut self, event_id: Uuid, delta: i32) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE events SET available_tickets = available_tickets + $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(delta)
        .bind(event_id)
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("event {event_id} vanished mid-transaction")));
        }
        Ok(())
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        let sql = format!(
            "INSERT INTO bookings (id, user_id, event_id, quantity, total_price, status, booking_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(booking.user_id)
            .bind(booking.event_id)
            .bind(booking.quantity)
            .bind(booking.total_price)
            .bind(BookingStatus::Confirmed.as_str())
            .bind(&booking.booking_code)
            .fetch_one(self.conn()?)
            .await?;

        row.try_into()
    }

    async fn set_booking_status(&mut self, id: Uuid, status: BookingStatus) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }
}

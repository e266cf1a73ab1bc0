//! Booking transaction manager.
//!
//! Every mutation of `available_tickets` or `balance` goes through here, each
//! as one store transaction. Lock order is event, then user. Cancellation
//! locks its own booking row first; creation never locks an existing booking,
//! so the event/user order is the one both paths must agree on.

use std::sync::Arc;

use rand::RngCore;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{is_money, Booking, BookingStatus, NewBooking, MAX_MONEY};
use crate::storage::{Store, StoreError};

pub const DEFAULT_MAX_TICKETS_PER_BOOKING: i32 = 10;

const BOOKING_CODE_PREFIX: &str = "BK-";
const BOOKING_CODE_BYTES: usize = 8;

/// Coarse classification the HTTP layer turns into a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    Unprocessable,
    Transient,
    Internal,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("quantity must be between 1 and {max}")]
    InvalidQuantity { max: i32 },

    #[error("event not found")]
    EventNotFound,

    #[error("not enough tickets available: requested {requested}, available {available}")]
    InsufficientInventory { available: i32, requested: i32 },

    #[error("user not found")]
    UserNotFound,

    #[error("insufficient balance: required {required}, available {balance}")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    #[error("booking code collision, please retry")]
    BookingConflict,

    #[error("booking not found")]
    BookingNotFound,

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    #[error("booking cannot be cancelled in status '{0}'")]
    NotCancellable(BookingStatus),

    #[error("amount must be positive, at most {MAX_MONEY}, with at most two decimal places")]
    InvalidAmount,

    #[error("balance cannot exceed {MAX_MONEY}")]
    BalanceLimit,

    #[error("resource busy, please retry")]
    Busy,

    #[error("internal booking failure: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::InvalidQuantity { .. }
            | BookingError::InvalidAmount
            | BookingError::BalanceLimit => ErrorKind::Invalid,
            BookingError::EventNotFound
            | BookingError::UserNotFound
            | BookingError::BookingNotFound => ErrorKind::NotFound,
            BookingError::BookingConflict
            | BookingError::AlreadyCancelled
            | BookingError::NotCancellable(_) => ErrorKind::Conflict,
            BookingError::InsufficientInventory { .. } | BookingError::InsufficientBalance { .. } => {
                ErrorKind::Unprocessable
            }
            BookingError::Busy => ErrorKind::Transient,
            BookingError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            BookingError::Busy
        } else {
            BookingError::Internal(err.to_string())
        }
    }
}

/// `BK-` followed by 16 lowercase hex characters.
pub fn generate_booking_code() -> String {
    let mut bytes = [0u8; BOOKING_CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{BOOKING_CODE_PREFIX}{}", hex::encode(bytes))
}

pub type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct BookingManager {
    store: Arc<dyn Store>,
    max_quantity: i32,
    codes: CodeGenerator,
}

impl BookingManager {
    pub fn new(store: Arc<dyn Store>, max_quantity: i32) -> Self {
        Self {
            store,
            max_quantity,
            codes: Arc::new(generate_booking_code),
        }
    }

    pub fn with_code_generator(mut self, codes: CodeGenerator) -> Self {
        self.codes = codes;
        self
    }

    /// Books `quantity` tickets for `user_id`, charging the current event
    /// price. Either the debit, the inventory decrement and the booking row
    /// all land, or none of them do.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        quantity: i32,
    ) -> Result<Booking, BookingError> {
        if !(1..=self.max_quantity).contains(&quantity) {
            return Err(BookingError::InvalidQuantity {
                max: self.max_quantity,
            });
        }

        let result = self.try_create(user_id, event_id, quantity).await;
        match &result {
            Ok(booking) => info!(
                %user_id,
                %event_id,
                booking_id = %booking.id,
                booking_code = %booking.booking_code,
                quantity,
                total_price = %booking.total_price,
                "booking created"
            ),
            Err(err) => report(err, user_id, "booking rejected"),
        }
        result
    }

    async fn try_create(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        quantity: i32,
    ) -> Result<Booking, BookingError> {
        let mut tx = self.store.begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(BookingError::EventNotFound)?;
        if event.available_tickets < quantity {
            return Err(BookingError::InsufficientInventory {
                available: event.available_tickets,
                requested: quantity,
            });
        }
        let total_price = event
            .price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| {
                BookingError::Internal(format!(
                    "total for {quantity} tickets at {} overflows",
                    event.price
                ))
            })?;

        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or(BookingError::UserNotFound)?;
        if user.balance < total_price {
            return Err(BookingError::InsufficientBalance {
                balance: user.balance,
                required: total_price,
            });
        }

        tx.adjust_balance(user_id, -total_price).await?;
        tx.adjust_available_tickets(event_id, -quantity).await?;

        let booking = tx
            .insert_booking(NewBooking {
                user_id,
                event_id,
                quantity,
                total_price,
                booking_code: (self.codes)(),
            })
            .await
            .map_err(|err| match err {
                StoreError::UniqueViolation(_) => BookingError::BookingConflict,
                other => other.into(),
            })?;

        tx.commit().await?;
        Ok(booking)
    }

    /// Cancels a confirmed booking owned by `user_id`, returning the tickets
    /// to the event and refunding the frozen total.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let result = self.try_cancel(booking_id, user_id).await;
        match &result {
            Ok(booking) => info!(
                %user_id,
                %booking_id,
                event_id = %booking.event_id,
                quantity = booking.quantity,
                refund = %booking.total_price,
                "booking cancelled"
            ),
            Err(err) => report(err, user_id, "cancellation rejected"),
        }
        result
    }

    async fn try_cancel(&self, booking_id: Uuid, user_id: Uuid) -> Result<Booking, BookingError> {
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .lock_booking(booking_id, user_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        match booking.status {
            BookingStatus::Confirmed => {}
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
            status => return Err(BookingError::NotCancellable(status)),
        }

        tx.set_booking_status(booking.id, BookingStatus::Cancelled)
            .await?;
        booking.status = BookingStatus::Cancelled;

        if tx.lock_event(booking.event_id).await?.is_none() {
            return Err(BookingError::Internal(format!(
                "event {} of booking {} no longer exists",
                booking.event_id, booking.id
            )));
        }
        tx.adjust_available_tickets(booking.event_id, booking.quantity)
            .await?;

        if tx.lock_user(user_id).await?.is_none() {
            return Err(BookingError::Internal(format!(
                "owner {user_id} of booking {} no longer exists",
                booking.id
            )));
        }
        tx.adjust_balance(user_id, booking.total_price).await?;

        tx.commit().await?;
        Ok(booking)
    }

    /// Credits `amount` to the user's balance and returns the new balance.
    pub async fn top_up_balance(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal, BookingError> {
        if amount.is_zero() || !is_money(amount) {
            return Err(BookingError::InvalidAmount);
        }

        let result = self.try_top_up(user_id, amount).await;
        match &result {
            Ok(balance) => info!(%user_id, %amount, %balance, "balance topped up"),
            Err(err) => report(err, user_id, "top-up rejected"),
        }
        result
    }

    async fn try_top_up(&self, user_id: Uuid, amount: Decimal) -> Result<Decimal, BookingError> {
        let mut tx = self.store.begin().await?;

        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or(BookingError::UserNotFound)?;
        let balance = user
            .balance
            .checked_add(amount)
            .filter(|balance| *balance <= MAX_MONEY)
            .ok_or(BookingError::BalanceLimit)?;
        tx.adjust_balance(user_id, amount).await?;

        tx.commit().await?;
        Ok(balance)
    }
}

fn report(err: &BookingError, user_id: Uuid, message: &str) {
    match err.kind() {
        ErrorKind::Internal => error!(%user_id, error = %err, "{message}"),
        ErrorKind::Transient => warn!(%user_id, error = %err, "{message}"),
        _ => info!(%user_id, error = %err, "{message}"),
    }
}

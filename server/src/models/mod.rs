pub mod booking;
pub mod event;
pub mod user;

use rust_decimal::Decimal;
use thiserror::Error;

pub use booking::{Booking, BookingStatus, BookingWithEvent, NewBooking};
pub use event::{Event, EventCategory, EventFilter, EventStock, NewEvent, Page};
pub use user::{NewUser, ProfileResponse, ProfileUpdate, User, UserFunds, UserResponse};

/// Decimal places every money column keeps.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(14, 2)` money column holds: 999999999999.99.
pub const MAX_MONEY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, MONEY_SCALE);

/// True for a non-negative amount that fits a money column without rounding.
pub fn is_money(amount: Decimal) -> bool {
    amount >= Decimal::ZERO && amount <= MAX_MONEY && amount.normalize().scale() <= MONEY_SCALE
}

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_bounds_match_the_column_type() {
        assert_eq!(MAX_MONEY, "999999999999.99".parse::<Decimal>().unwrap());
        assert!(is_money(Decimal::ZERO));
        assert!(is_money(MAX_MONEY));
        assert!(is_money("12.50".parse().unwrap()));
        assert!(!is_money("1000000000000".parse().unwrap()));
        assert!(!is_money(Decimal::MAX));
        assert!(!is_money("0.001".parse().unwrap()));
        assert!(!is_money("-1".parse().unwrap()));
    }
}

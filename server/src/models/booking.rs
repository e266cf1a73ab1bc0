use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Lifecycle of a booking. `Confirmed -> Cancelled` is the only transition
/// this service performs; `Used` is set by ticket control elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Used,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Used => "used",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "used" => Ok(BookingStatus::Used),
            other => Err(UnknownVariant {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    /// Frozen at booking time; never recomputed from the event price.
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub booking_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub total_price: Decimal,
    pub booking_code: String,
}

/// A booking joined with the event fields shown in "my tickets".
#[derive(Debug, Clone, Serialize)]
pub struct BookingWithEvent {
    #[serde(flatten)]
    pub booking: Booking,
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub venue: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!("confirmed".parse(), Ok(BookingStatus::Confirmed));
        assert_eq!("cancelled".parse(), Ok(BookingStatus::Cancelled));
        assert_eq!("used".parse(), Ok(BookingStatus::Used));
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn booking_with_event_serializes_flat() {
        let now = Utc::now();
        let view = BookingWithEvent {
            booking: Booking {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                quantity: 2,
                total_price: Decimal::new(20000, 2),
                status: BookingStatus::Confirmed,
                booking_code: "BK-00112233aabbccdd".to_string(),
                created_at: now,
            },
            event_title: "Jazz night".to_string(),
            event_date: now,
            venue: "Blue Hall".to_string(),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "confirmed");
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["event_title"], "Jazz night");
        assert_eq!(json["booking_code"], "BK-00112233aabbccdd");
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Concert,
    Sport,
    Theater,
    Exhibition,
    Festival,
    Other,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Concert => "concert",
            EventCategory::Sport => "sport",
            EventCategory::Theater => "theater",
            EventCategory::Exhibition => "exhibition",
            EventCategory::Festival => "festival",
            EventCategory::Other => "other",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concert" => Ok(EventCategory::Concert),
            "sport" => Ok(EventCategory::Sport),
            "theater" => Ok(EventCategory::Theater),
            "exhibition" => Ok(EventCategory::Exhibition),
            "festival" => Ok(EventCategory::Festival),
            "other" => Ok(EventCategory::Other),
            other => Err(UnknownVariant {
                kind: "event category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub image_url: Option<String>,
    pub venue: String,
    pub address: String,
    pub price: Decimal,
    pub capacity: i32,
    pub available_tickets: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub image_url: Option<String>,
    pub venue: String,
    pub address: String,
    pub price: Decimal,
    pub capacity: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub creator_id: Uuid,
}

/// Inventory and pricing columns of an event, as read under a row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStock {
    pub id: Uuid,
    pub price: Decimal,
    pub capacity: i32,
    pub available_tickets: i32,
}

/// Search criteria. Every `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub query: Option<String>,
    pub category: Option<EventCategory>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
}

impl EventFilter {
    /// In-process evaluation of the filter, mirroring the SQL predicate.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(query) = &self.query {
            let needle = query.to_lowercase();
            let hit = [
                &event.title,
                &event.description,
                &event.venue,
                &event.address,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != event.category) {
            return false;
        }
        if self.date_from.is_some_and(|from| event.start_time < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| event.start_time > to) {
            return false;
        }
        if self.price_min.is_some_and(|min| event.price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| event.price > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Event, EventCategory, EventFilter, Page, UnknownVariant};
use crate::storage::{Store, StoreResult};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    UnknownCategory(#[from] UnknownVariant),

    #[error("{0} must not be negative")]
    NegativePrice(&'static str),
}

/// Raw query string of `GET /search` and `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SearchParams {
    pub fn into_filter(self) -> Result<(EventFilter, Page), SearchError> {
        for (name, bound) in [("price_min", self.price_min), ("price_max", self.price_max)] {
            if bound.is_some_and(|price| price < Decimal::ZERO) {
                return Err(SearchError::NegativePrice(name));
            }
        }

        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| c.to_lowercase().parse::<EventCategory>())
            .transpose()?;

        let query = self
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let filter = EventFilter {
            query,
            category,
            date_from: self.date_from,
            date_to: self.date_to,
            price_min: self.price_min,
            price_max: self.price_max,
        };
        Ok((filter, page(self.limit, self.offset)))
    }
}

pub fn page(limit: Option<i64>, offset: Option<i64>) -> Page {
    Page {
        limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset: offset.unwrap_or(0).max(0),
    }
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub events: Vec<Event>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl SearchPage {
    pub fn new(events: Vec<Event>, total: i64, page: Page) -> Self {
        let has_more = page.offset + (events.len() as i64) < total;
        Self {
            events,
            total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        }
    }
}

pub async fn search(store: &dyn Store, filter: &EventFilter, page: Page) -> StoreResult<SearchPage> {
    let (events, total) = store.search_events(filter, page).await?;
    Ok(SearchPage::new(events, total, page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEvent, NewUser};
    use crate::storage::MemoryStore;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(page(None, None), Page { limit: 20, offset: 0 });
        assert_eq!(page(Some(500), Some(-3)), Page { limit: 100, offset: 0 });
        assert_eq!(page(Some(0), Some(40)), Page { limit: 1, offset: 40 });
    }

    #[test]
    fn blank_query_and_category_are_ignored() {
        let params = SearchParams {
            q: Some("   ".into()),
            category: Some("".into()),
            ..Default::default()
        };
        let (filter, _) = params.into_filter().unwrap();
        assert_eq!(filter, EventFilter::default());
    }

    #[test]
    fn category_is_case_insensitive_and_validated() {
        let params = SearchParams {
            category: Some("Sport".into()),
            q: Some("  derby ".into()),
            ..Default::default()
        };
        let (filter, _) = params.into_filter().unwrap();
        assert_eq!(filter.category, Some(EventCategory::Sport));
        assert_eq!(filter.query.as_deref(), Some("derby"));

        let bad = SearchParams {
            category: Some("opera".into()),
            ..Default::default()
        };
        assert!(matches!(bad.into_filter(), Err(SearchError::UnknownCategory(_))));
    }

    #[test]
    fn negative_price_bound_is_rejected() {
        let params = SearchParams {
            price_min: Some(Decimal::new(-1, 0)),
            ..Default::default()
        };
        assert!(matches!(
            params.into_filter(),
            Err(SearchError::NegativePrice("price_min"))
        ));
    }

    #[tokio::test]
    async fn pages_report_has_more() {
        let store = MemoryStore::default();
        let creator = store
            .create_user(NewUser {
                email: "org@example.com".into(),
                name: "Org".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let base = Utc::now() + chrono::Duration::days(1);
        for day in 0..5 {
            let start = base + chrono::Duration::days(day);
            store
                .create_event(NewEvent {
                    title: format!("Show {day}"),
                    description: String::new(),
                    category: EventCategory::Theater,
                    image_url: None,
                    venue: "Hall".into(),
                    address: "Street".into(),
                    price: Decimal::new(10, 0),
                    capacity: 5,
                    start_time: start,
                    end_time: start + chrono::Duration::hours(2),
                    creator_id: creator.id,
                })
                .await
                .unwrap();
        }

        let filter = EventFilter::default();
        let first = search(&store, &filter, page(Some(2), None)).await.unwrap();
        assert_eq!(first.total, 5);
        assert!(first.has_more);
        assert_eq!(first.events[0].title, "Show 0");

        let last = search(&store, &filter, page(Some(2), Some(4))).await.unwrap();
        assert_eq!(last.events.len(), 1);
        assert_eq!(last.events[0].title, "Show 4");
        assert!(!last.has_more);
    }
}

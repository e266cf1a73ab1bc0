//! Runs the booking transactions against a real Postgres, with real row
//! locks. Skipped unless `TEST_DATABASE_URL` points at a database the tests
//! may migrate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use eventbook_server::models::{BookingStatus, EventCategory, NewEvent, NewUser};
use eventbook_server::services::{BookingError, BookingManager};
use eventbook_server::storage::{PgStore, Store};

async fn store() -> Option<Arc<PgStore>> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping Postgres test");
            return None;
        }
    };
    let store = PgStore::connect(&url, 20, Duration::from_secs(5))
        .await
        .unwrap();
    store.migrate().await.unwrap();
    Some(Arc::new(store))
}

async fn user(store: &PgStore, manager: &BookingManager, balance: i64) -> Uuid {
    let user = store
        .create_user(NewUser {
            email: format!("{}@example.com", Uuid::new_v4()),
            name: "Buyer".to_string(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap();
    if balance > 0 {
        manager
            .top_up_balance(user.id, Decimal::from(balance))
            .await
            .unwrap();
    }
    user.id
}

async fn event(store: &PgStore, creator_id: Uuid, capacity: i32) -> Uuid {
    let start = Utc::now() + chrono::Duration::days(5);
    store
        .create_event(NewEvent {
            title: "Load test".to_string(),
            description: String::new(),
            category: EventCategory::Other,
            image_url: None,
            venue: "Arena".to_string(),
            address: "Somewhere".to_string(),
            price: Decimal::from(10),
            capacity,
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
            creator_id,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_do_not_oversell() {
    let Some(store) = store().await else { return };
    let manager = BookingManager::new(store.clone(), 10);
    let organizer = user(&store, &manager, 0).await;
    let event_id = event(&store, organizer, 10).await;

    let mut buyers = Vec::new();
    for _ in 0..12 {
        buyers.push(user(&store, &manager, 100).await);
    }

    let attempts = buyers.iter().map(|&buyer| {
        let manager = manager.clone();
        tokio::spawn(async move { manager.create_booking(buyer, event_id, 2).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let sold: i32 = results.iter().flatten().map(|b| b.quantity).sum();
    assert_eq!(sold, 10);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(BookingError::InsufficientInventory { .. })
    )));

    let event = store.find_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.available_tickets, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn last_ticket_race_has_one_winner() {
    let Some(store) = store().await else { return };
    let manager = BookingManager::new(store.clone(), 10);
    let organizer = user(&store, &manager, 0).await;
    let event_id = event(&store, organizer, 1).await;
    let first = user(&store, &manager, 50).await;
    let second = user(&store, &manager, 50).await;

    let (a, b) = tokio::join!(
        manager.create_booking(first, event_id, 1),
        manager.create_booking(second, event_id, 1)
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser,
        Err(BookingError::InsufficientInventory { .. })
    ));
}

#[tokio::test]
async fn cancellation_round_trip() {
    let Some(store) = store().await else { return };
    let manager = BookingManager::new(store.clone(), 10);
    let organizer = user(&store, &manager, 0).await;
    let event_id = event(&store, organizer, 5).await;
    let buyer = user(&store, &manager, 30).await;

    let booking = manager.create_booking(buyer, event_id, 3).await.unwrap();
    store
        .update_event_price(event_id, organizer, Decimal::from(99))
        .await
        .unwrap();
    manager.cancel_booking(booking.id, buyer).await.unwrap();

    assert!(matches!(
        manager.cancel_booking(booking.id, buyer).await,
        Err(BookingError::AlreadyCancelled)
    ));
    let user = store.find_user(buyer).await.unwrap().unwrap();
    assert_eq!(user.balance, Decimal::from(30));
    let event = store.find_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.available_tickets, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_cancellations_and_bookings_finish_without_deadlock() {
    let Some(store) = store().await else { return };
    let manager = BookingManager::new(store.clone(), 10);
    let organizer = user(&store, &manager, 0).await;
    let event_id = event(&store, organizer, 20).await;

    let mut holders = Vec::new();
    for _ in 0..10 {
        let holder = user(&store, &manager, 50).await;
        let booking = manager.create_booking(holder, event_id, 2).await.unwrap();
        holders.push((holder, booking.id));
    }
    let mut newcomers = Vec::new();
    for _ in 0..10 {
        newcomers.push(user(&store, &manager, 20).await);
    }

    let mut tasks = Vec::new();
    for (&(holder, booking_id), &newcomer) in holders.iter().zip(&newcomers) {
        let canceller = manager.clone();
        tasks.push(tokio::spawn(async move {
            canceller.cancel_booking(booking_id, holder).await.map(|_| 0)
        }));
        let buyer = manager.clone();
        tasks.push(tokio::spawn(async move {
            buyer
                .create_booking(newcomer, event_id, 2)
                .await
                .map(|b| b.quantity)
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("mixed workload did not finish");
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(BookingError::InsufficientInventory { .. }) | Err(BookingError::Busy)
    )));

    let mut sold = 0;
    for &(holder, booking_id) in &holders {
        let booking = store
            .find_booking(booking_id, holder)
            .await
            .unwrap()
            .unwrap()
            .booking;
        let balance = store.find_user(holder).await.unwrap().unwrap().balance;
        if booking.status == BookingStatus::Cancelled {
            assert_eq!(balance, Decimal::from(50));
        } else {
            assert_eq!(balance, Decimal::from(30));
            sold += booking.quantity;
        }
    }
    for &newcomer in &newcomers {
        let bookings = store.list_bookings(newcomer).await.unwrap();
        let balance = store.find_user(newcomer).await.unwrap().unwrap().balance;
        match bookings.len() {
            0 => assert_eq!(balance, Decimal::from(20)),
            1 => {
                assert_eq!(balance, Decimal::ZERO);
                sold += 2;
            }
            n => panic!("newcomer holds {n} bookings"),
        }
    }

    let event = store.find_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.available_tickets + sold, 20);
}

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::{ReservationStore, StoreError};

pub fn day(s: &str) -> DayKey {
    DayKey::parse(s).unwrap()
}

pub fn slot(a: &str, b: &str) -> Slot {
    Slot::new(a.parse().unwrap(), b.parse().unwrap())
}

pub fn draft(venue_id: Ulid, date: &str, a: &str, b: &str) -> ReservationDraft {
    ReservationDraft {
        venue_id,
        date: day(date),
        slot: slot(a, b),
        title: "Tech Conference 2025".into(),
        description: "Talks and workshops".into(),
        registration_link: "https://example.com/register".into(),
    }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("venuebook_test_booking");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Fresh engine over an empty WAL with a single venue.
pub fn engine_with_venue(wal_name: &str) -> (Arc<Engine>, Ulid) {
    let venue = Venue {
        id: Ulid::new(),
        name: "Main Hall".into(),
        capacity: 200,
        description: String::new(),
    };
    let id = venue.id;
    let engine = Engine::new(test_wal_path(wal_name), vec![venue], Arc::new(NotifyHub::new())).unwrap();
    (Arc::new(engine), id)
}

pub async fn seed(engine: &Engine, venue: Ulid, date: &str, a: &str, b: &str) -> Reservation {
    engine
        .commit_reservation(draft(venue, date, a, b), OwnerId::new("seed"))
        .await
        .unwrap()
}

/// Store that must never be called; counts any call that slips through.
#[derive(Default)]
pub struct CountingStore {
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) -> StoreError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StoreError::Unavailable("counting store".into())
    }
}

#[async_trait]
impl ReservationStore for CountingStore {
    async fn list_reservations(&self, _: Ulid, _: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        Err(self.hit())
    }
    async fn insert_reservation(&self, _: ReservationDraft, _: OwnerId) -> Result<Reservation, StoreError> {
        Err(self.hit())
    }
    async fn get_reservation(&self, _: Ulid) -> Result<Reservation, StoreError> {
        Err(self.hit())
    }
    async fn cancel_reservation(&self, _: Ulid) -> Result<Reservation, StoreError> {
        Err(self.hit())
    }
    async fn reschedule_reservation(&self, _: Ulid, _: DayKey, _: Slot) -> Result<Reservation, StoreError> {
        Err(self.hit())
    }
}

/// Store whose backend is down.
pub struct FailingStore;

#[async_trait]
impl ReservationStore for FailingStore {
    async fn list_reservations(&self, _: Ulid, _: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn insert_reservation(&self, _: ReservationDraft, _: OwnerId) -> Result<Reservation, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn get_reservation(&self, _: Ulid) -> Result<Reservation, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn cancel_reservation(&self, _: Ulid) -> Result<Reservation, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn reschedule_reservation(&self, _: Ulid, _: DayKey, _: Slot) -> Result<Reservation, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Engine whose reads always come back empty, as if every read raced ahead
/// of a concurrent commit. Writes go to the real engine.
pub struct StaleReadStore {
    pub inner: Arc<Engine>,
    pub inserts: AtomicUsize,
}

impl StaleReadStore {
    pub fn new(inner: Arc<Engine>) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReservationStore for StaleReadStore {
    async fn list_reservations(&self, _: Ulid, _: &DayKey) -> Result<Vec<Reservation>, StoreError> {
        Ok(Vec::new())
    }
    async fn insert_reservation(&self, draft: ReservationDraft, owner: OwnerId) -> Result<Reservation, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_reservation(draft, owner).await
    }
    async fn get_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.inner.find_reservation(id).await
    }
    async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.inner.cancel_reservation(id).await
    }
    async fn reschedule_reservation(&self, id: Ulid, date: DayKey, slot: Slot) -> Result<Reservation, StoreError> {
        self.inner.reschedule_reservation(id, date, slot).await
    }
}

use std::collections::BTreeMap;

use ulid::Ulid;

use crate::model::*;
use crate::store::StoreError;

use super::Engine;
use super::availability::free_slots;

impl Engine {
    /// Catalog venues, ordered by name.
    pub fn list_venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.venues.iter().map(|e| e.value().clone()).collect();
        venues.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        venues
    }

    pub fn get_venue(&self, id: &Ulid) -> Option<Venue> {
        self.venues.get(id).map(|e| e.value().clone())
    }

    /// Reservations for one venue on one date, ordered by start.
    pub async fn reservations_for_day(&self, venue_id: Ulid, date: &DayKey) -> Vec<Reservation> {
        let Some(day) = self.day_handle(&(venue_id, date.clone())) else {
            return Vec::new();
        };
        let guard = day.read().await;
        guard.reservations.clone()
    }

    pub async fn find_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        loop {
            let key = self.day_of(&id).ok_or(StoreError::NotFound(id))?;
            let Some(day) = self.day_handle(&key) else {
                return Err(StoreError::NotFound(id));
            };
            let guard = day.read().await;
            if let Some(r) = guard.reservations.iter().find(|r| r.id == id) {
                return Ok(r.clone());
            }
        }
    }

    /// Unreserved time for a venue/date inside `window`.
    pub async fn free_slots(&self, venue_id: Ulid, date: &DayKey, window: Slot) -> Vec<Slot> {
        let Some(day) = self.day_handle(&(venue_id, date.clone())) else {
            return free_slots(&[], &window);
        };
        let guard = day.read().await;
        free_slots(&guard.slots(), &window)
    }

    /// Every reservation on or after `from`, ordered by date then start,
    /// optionally restricted to one venue.
    pub async fn upcoming(&self, from: &DayKey, venue_id: Option<Ulid>) -> Vec<Reservation> {
        let handles: Vec<_> = self
            .days
            .iter()
            .filter(|e| {
                let (venue, date) = e.key();
                date >= from && venue_id.is_none_or(|v| v == *venue)
            })
            .map(|e| e.value().clone())
            .collect();

        let mut out = Vec::new();
        for day in handles {
            let guard = day.read().await;
            out.extend(guard.reservations.iter().cloned());
        }
        out.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.slot.start.cmp(&b.slot.start))
                .then(a.venue_id.cmp(&b.venue_id))
        });
        out
    }

    /// Number of reservations per date on or after `from`. Dates with none
    /// are left out.
    pub async fn density(&self, from: &DayKey, venue_id: Option<Ulid>) -> BTreeMap<DayKey, usize> {
        let handles: Vec<_> = self
            .days
            .iter()
            .filter(|e| {
                let (venue, date) = e.key();
                date >= from && venue_id.is_none_or(|v| v == *venue)
            })
            .map(|e| e.value().clone())
            .collect();

        let mut counts = BTreeMap::new();
        for day in handles {
            let guard = day.read().await;
            if !guard.reservations.is_empty() {
                *counts.entry(guard.date.clone()).or_insert(0) += guard.reservations.len();
            }
        }
        counts
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_days.len()
    }
}

use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::store::StoreError;

use super::conflict::{check_day_capacity, check_no_conflict, now_ms, validate_slot};
use super::{Engine, WalCommand};

impl Engine {
    /// Insert a reservation if its slot is free. The overlap check, the WAL
    /// append and the index update all happen under the day's write lock.
    pub async fn commit_reservation(
        &self,
        draft: ReservationDraft,
        owner: OwnerId,
    ) -> Result<Reservation, StoreError> {
        validate_slot(&draft.slot)?;
        if !self.venues.contains_key(&draft.venue_id) {
            return Err(StoreError::UnknownVenue(draft.venue_id));
        }

        let _gate = self.compaction_gate.read().await;
        let key = (draft.venue_id, draft.date.clone());
        let day = self.day_handle_or_create(&key);
        let mut guard = day.write().await;
        check_day_capacity(&guard)?;
        check_no_conflict(&guard, &draft.slot, None)?;

        let reservation = Reservation {
            id: Ulid::new(),
            venue_id: draft.venue_id,
            date: draft.date,
            slot: draft.slot,
            title: draft.title,
            description: draft.description,
            registration_link: draft.registration_link,
            owner,
            created_at: now_ms(),
        };
        let event = Event::ReservationCommitted {
            reservation: reservation.clone(),
        };
        self.wal_append(&event).await?;
        guard.insert_reservation(reservation.clone());
        self.reservation_days.insert(reservation.id, key);
        self.notify.send(&event);

        debug!(
            id = %reservation.id,
            venue = %reservation.venue_id,
            date = %reservation.date,
            slot = %reservation.slot,
            "reservation committed"
        );
        Ok(reservation)
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let ((venue_id, date), mut guard) = self.resolve_reservation_write(&id).await?;

        let event = Event::ReservationCancelled {
            id,
            venue_id,
            date,
        };
        self.wal_append(&event).await?;
        let removed = guard.remove_reservation(id).ok_or(StoreError::NotFound(id))?;
        self.reservation_days.remove(&id);
        self.notify.send(&event);

        debug!(%id, venue = %venue_id, "reservation cancelled");
        Ok(removed)
    }

    /// Move a reservation to another slot, possibly on another date of the same
    /// venue. The target day is checked the same way a fresh insert is, except
    /// that the reservation never conflicts with itself.
    pub async fn reschedule_reservation(
        &self,
        id: Ulid,
        date: DayKey,
        slot: Slot,
    ) -> Result<Reservation, StoreError> {
        validate_slot(&slot)?;
        let _gate = self.compaction_gate.read().await;

        loop {
            let from_key = self.day_of(&id).ok_or(StoreError::NotFound(id))?;
            let venue_id = from_key.0;
            let to_key = (venue_id, date.clone());

            if from_key == to_key {
                let (_, mut guard) = self.resolve_reservation_write(&id).await?;
                if guard.date != date {
                    // moved to another day while we waited
                    continue;
                }
                check_no_conflict(&guard, &slot, Some(id))?;
                let event = Event::ReservationRescheduled {
                    id,
                    venue_id,
                    from_date: date.clone(),
                    date,
                    slot,
                };
                self.wal_append(&event).await?;
                let mut moved = guard.remove_reservation(id).ok_or(StoreError::NotFound(id))?;
                moved.slot = slot;
                guard.insert_reservation(moved.clone());
                self.notify.send(&event);
                return Ok(moved);
            }

            let from_day = self.day_handle(&from_key).ok_or(StoreError::NotFound(id))?;
            let to_day = self.day_handle_or_create(&to_key);
            // Two day locks: always acquire in key order.
            let (mut from_guard, mut to_guard) = if from_key < to_key {
                let f = from_day.write_owned().await;
                (f, to_day.write_owned().await)
            } else {
                let t = to_day.write_owned().await;
                (from_day.write_owned().await, t)
            };
            if !from_guard.reservations.iter().any(|r| r.id == id) {
                continue;
            }
            check_day_capacity(&to_guard)?;
            check_no_conflict(&to_guard, &slot, None)?;

            let event = Event::ReservationRescheduled {
                id,
                venue_id,
                from_date: from_key.1.clone(),
                date: date.clone(),
                slot,
            };
            self.wal_append(&event).await?;
            let mut moved = from_guard
                .remove_reservation(id)
                .ok_or(StoreError::NotFound(id))?;
            moved.date = date;
            moved.slot = slot;
            to_guard.insert_reservation(moved.clone());
            self.reservation_days.insert(id, to_key);
            self.notify.send(&event);

            debug!(%id, venue = %venue_id, from = %from_key.1, to = %moved.date, "reservation moved");
            return Ok(moved);
        }
    }

    /// Rewrite the WAL with one commit record per live reservation and drop
    /// day entries that no longer hold anything.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;

        let handles: Vec<_> = self.days.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for day in handles {
            let guard = day.read().await;
            events.extend(guard.reservations.iter().map(|r| Event::ReservationCommitted {
                reservation: r.clone(),
            }));
        }
        let live = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL compaction failed: {e}")))?;

        self.days
            .retain(|_, day| day.try_read().map_or(true, |g| !g.reservations.is_empty()));
        info!(reservations = live, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKING_COMMIT_DURATION_SECONDS, BOOKING_WRITES_TOTAL};
use crate::store::ReservationStore;

use super::{AvailabilityChecker, AvailabilityResult, BookingError, ensure_range};

fn require_owner(owner: Option<OwnerId>) -> Result<OwnerId, BookingError> {
    match owner {
        Some(o) if o.as_str().trim().is_empty() => Err(BookingError::Unauthenticated),
        Some(o) if o.as_str().len() > MAX_OWNER_ID_LEN => {
            Err(BookingError::Validation("owner id too long"))
        }
        Some(o) => Ok(o),
        None => Err(BookingError::Unauthenticated),
    }
}

fn require_text(value: &str, max: usize, missing: &'static str, too_long: &'static str) -> Result<(), BookingError> {
    if value.trim().is_empty() {
        return Err(BookingError::Validation(missing));
    }
    if value.len() > max {
        return Err(BookingError::Validation(too_long));
    }
    Ok(())
}

fn validate_draft(draft: &ReservationDraft) -> Result<(), BookingError> {
    ensure_range(&draft.slot)?;
    require_text(&draft.title, MAX_TITLE_LEN, "title is required", "title too long")?;
    require_text(
        &draft.description,
        MAX_DESCRIPTION_LEN,
        "description is required",
        "description too long",
    )?;
    require_text(
        &draft.registration_link,
        MAX_LINK_LEN,
        "registration link is required",
        "registration link too long",
    )
}

fn first_conflict(result: &AvailabilityResult) -> Option<Ulid> {
    match result {
        AvailabilityResult::Available => None,
        AvailabilityResult::Conflict { conflicting, .. } => conflicting.first().copied(),
    }
}

fn record(op: &'static str, outcome: &Result<Reservation, BookingError>) {
    let status = match outcome {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(BOOKING_WRITES_TOTAL, "op" => op, "status" => status).increment(1);
}

/// Authoritative write path.
///
/// Every write re-checks availability against fresh store state first, then
/// leaves the final decision to the store's exclusion constraint. Either layer
/// rejecting the slot surfaces as `BookingError::Conflict`.
pub struct BookingCommitter<S: ?Sized> {
    store: Arc<S>,
    checker: AvailabilityChecker<S>,
}

impl<S: ReservationStore + ?Sized> BookingCommitter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            checker: AvailabilityChecker::new(store.clone()),
            store,
        }
    }

    pub fn checker(&self) -> &AvailabilityChecker<S> {
        &self.checker
    }

    pub async fn commit_booking(
        &self,
        draft: ReservationDraft,
        owner: Option<OwnerId>,
    ) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let outcome = self.try_commit(draft, owner).await;
        metrics::histogram!(BOOKING_COMMIT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        record("commit", &outcome);
        outcome
    }

    async fn try_commit(
        &self,
        draft: ReservationDraft,
        owner: Option<OwnerId>,
    ) -> Result<Reservation, BookingError> {
        let owner = require_owner(owner)?;
        validate_draft(&draft)?;

        // Whatever the caller was shown earlier is stale by now.
        let fresh = self
            .checker
            .check_availability(draft.venue_id, &draft.date, draft.slot)
            .await?;
        if let Some(conflicting) = first_conflict(&fresh) {
            info!(venue = %draft.venue_id, date = %draft.date, slot = %draft.slot, %conflicting, "booking rejected: slot taken");
            return Err(BookingError::Conflict { conflicting });
        }

        let venue_id = draft.venue_id;
        let slot = draft.slot;
        match self.store.insert_reservation(draft, owner).await {
            Ok(reservation) => {
                info!(
                    id = %reservation.id,
                    venue = %reservation.venue_id,
                    date = %reservation.date,
                    slot = %reservation.slot,
                    owner = %reservation.owner,
                    "venue booked"
                );
                Ok(reservation)
            }
            Err(e) => {
                let err = BookingError::from(e);
                match &err {
                    BookingError::Conflict { conflicting } => {
                        info!(venue = %venue_id, %slot, %conflicting, "booking lost a concurrent commit");
                    }
                    other => warn!(venue = %venue_id, %slot, "booking failed: {other}"),
                }
                Err(err)
            }
        }
    }

    /// Cancel a reservation. Only its owner may do so.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        owner: Option<OwnerId>,
    ) -> Result<Reservation, BookingError> {
        let outcome = self.try_cancel(id, owner).await;
        record("cancel", &outcome);
        outcome
    }

    async fn try_cancel(&self, id: Ulid, owner: Option<OwnerId>) -> Result<Reservation, BookingError> {
        let owner = require_owner(owner)?;
        let existing = self.store.get_reservation(id).await?;
        if existing.owner != owner {
            return Err(BookingError::NotOwner(id));
        }
        let removed = self.store.cancel_reservation(id).await?;
        info!(%id, venue = %removed.venue_id, date = %removed.date, "booking cancelled");
        Ok(removed)
    }

    /// Move a reservation to another date/slot at the same venue, under the
    /// same two-layer check as a fresh booking.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        date: DayKey,
        slot: Slot,
        owner: Option<OwnerId>,
    ) -> Result<Reservation, BookingError> {
        let outcome = self.try_reschedule(id, date, slot, owner).await;
        record("reschedule", &outcome);
        outcome
    }

    async fn try_reschedule(
        &self,
        id: Ulid,
        date: DayKey,
        slot: Slot,
        owner: Option<OwnerId>,
    ) -> Result<Reservation, BookingError> {
        let owner = require_owner(owner)?;
        ensure_range(&slot)?;
        let existing = self.store.get_reservation(id).await?;
        if existing.owner != owner {
            return Err(BookingError::NotOwner(id));
        }

        let fresh = self
            .checker
            .check_ignoring(existing.venue_id, &date, slot, Some(id))
            .await?;
        if let Some(conflicting) = first_conflict(&fresh) {
            return Err(BookingError::Conflict { conflicting });
        }

        let moved = self.store.reschedule_reservation(id, date, slot).await?;
        info!(%id, venue = %moved.venue_id, date = %moved.date, slot = %moved.slot, "booking rescheduled");
        Ok(moved)
    }
}

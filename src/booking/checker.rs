use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::evaluate;
use crate::model::*;
use crate::observability::{AVAILABILITY_CHECKS_TOTAL, AVAILABILITY_CHECK_DURATION_SECONDS};
use crate::store::ReservationStore;

use super::{BookingError, ensure_range};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AvailabilityResult {
    Available,
    Conflict {
        reason: String,
        /// Earliest interior gap of the day, when there is one.
        suggestion: Option<Slot>,
        /// Overlapping reservations, in start order.
        conflicting: Vec<Ulid>,
    },
}

impl AvailabilityResult {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityResult::Available)
    }

    fn label(&self) -> &'static str {
        match self {
            AvailabilityResult::Available => "available",
            AvailabilityResult::Conflict { .. } => "conflict",
        }
    }
}

/// Judge `slot` against a day's reservations (sorted by start).
fn assess(slot: &Slot, existing: &[Reservation]) -> AvailabilityResult {
    let slots: Vec<Slot> = existing.iter().map(|r| r.slot).collect();
    let verdict = evaluate(slot, &slots);
    if !verdict.overlaps {
        return AvailabilityResult::Available;
    }
    let reason = match verdict.suggestion {
        Some(gap) => format!("Venue is booked. Next available slot: {gap}"),
        None => "Venue is not available for the selected time slot".to_string(),
    };
    AvailabilityResult::Conflict {
        reason,
        suggestion: verdict.suggestion,
        conflicting: existing
            .iter()
            .filter(|r| r.slot.overlaps(slot))
            .map(|r| r.id)
            .collect(),
    }
}

/// Read-only availability check. Never writes, so calling it any number of
/// times (or skipping it) has no effect on correctness.
pub struct AvailabilityChecker<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for AvailabilityChecker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ReservationStore + ?Sized> AvailabilityChecker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn check_availability(
        &self,
        venue_id: Ulid,
        date: &DayKey,
        slot: Slot,
    ) -> Result<AvailabilityResult, BookingError> {
        self.check_ignoring(venue_id, date, slot, None).await
    }

    /// Same as [`check_availability`](Self::check_availability), but the
    /// reservation `ignore` (one being moved) is left out of the comparison.
    pub(crate) async fn check_ignoring(
        &self,
        venue_id: Ulid,
        date: &DayKey,
        slot: Slot,
        ignore: Option<Ulid>,
    ) -> Result<AvailabilityResult, BookingError> {
        ensure_range(&slot)?;
        let started = Instant::now();

        let assessed = self
            .store
            .list_reservations(venue_id, date)
            .await
            .map(|mut existing| {
                if let Some(id) = ignore {
                    existing.retain(|r| r.id != id);
                }
                existing.sort_by_key(|r| r.slot.start);
                assess(&slot, &existing)
            });
        metrics::histogram!(AVAILABILITY_CHECK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match assessed {
            Ok(result) => {
                metrics::counter!(AVAILABILITY_CHECKS_TOTAL, "outcome" => result.label()).increment(1);
                debug!(venue = %venue_id, %date, %slot, outcome = result.label(), "availability checked");
                Ok(result)
            }
            Err(e) => {
                // Fail closed: an unreachable store is never "available".
                warn!(venue = %venue_id, %date, "availability check failed: {e}");
                metrics::counter!(AVAILABILITY_CHECKS_TOTAL, "outcome" => "error").increment(1);
                Err(e.into())
            }
        }
    }
}

use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS_PER_DAY;
use crate::model::*;
use crate::store::StoreError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_slot(slot: &Slot) -> Result<(), StoreError> {
    if !slot.is_valid() {
        return Err(StoreError::InvalidSlot(*slot));
    }
    Ok(())
}

pub(crate) fn check_day_capacity(day: &DayState) -> Result<(), StoreError> {
    if day.reservations.len() >= MAX_RESERVATIONS_PER_DAY {
        return Err(StoreError::LimitExceeded("too many reservations on this day"));
    }
    Ok(())
}

/// The exclusion constraint. Caller holds the day's write lock, so nothing can
/// slip in between this check and the write that follows it.
/// `moving` is a reservation being rescheduled within the same day; it does not
/// conflict with itself.
pub(crate) fn check_no_conflict(
    day: &DayState,
    slot: &Slot,
    moving: Option<Ulid>,
) -> Result<(), StoreError> {
    match day.overlapping(slot).find(|r| Some(r.id) != moving) {
        Some(existing) => Err(StoreError::UniqueConstraintViolation {
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

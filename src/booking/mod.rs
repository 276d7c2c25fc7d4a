//! Availability checking and booking commits on top of a [`ReservationStore`].
//!
//! The checker is advisory and read-only. The committer re-runs the same check
//! right before writing and relies on the store's exclusion constraint for the
//! final word, so a stale "available" never turns into a double booking.
//!
//! [`ReservationStore`]: crate::store::ReservationStore

mod checker;
mod committer;
mod error;
#[cfg(test)]
mod test_support;
mod watch;

pub use checker::{AvailabilityChecker, AvailabilityResult};
pub use committer::BookingCommitter;
pub use error::BookingError;
pub use watch::{AvailabilityWatch, CheckState, DEFAULT_DEBOUNCE};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{DayKey, Slot};

/// A candidate (venue, date, start, end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub venue_id: Ulid,
    pub date: DayKey,
    #[serde(flatten)]
    pub slot: Slot,
}

fn ensure_range(slot: &Slot) -> Result<(), BookingError> {
    if !slot.is_valid() {
        return Err(BookingError::InvalidRange(*slot));
    }
    Ok(())
}

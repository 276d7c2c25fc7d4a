//! Data-access seam between the booking core and whatever persists reservations.

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An overlapping reservation already exists for the same venue and date.
    UniqueConstraintViolation { conflicting: Ulid },
    UnknownVenue(Ulid),
    NotFound(Ulid),
    /// `start >= end`; the store refuses it even if the caller forgot to check.
    InvalidSlot(Slot),
    LimitExceeded(&'static str),
    /// The store could not be reached or failed to persist. Nothing was written.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UniqueConstraintViolation { conflicting } => {
                write!(f, "overlaps existing reservation {conflicting}")
            }
            StoreError::UnknownVenue(id) => write!(f, "unknown venue: {id}"),
            StoreError::NotFound(id) => write!(f, "reservation not found: {id}"),
            StoreError::InvalidSlot(slot) => write!(f, "invalid slot {slot}: start must be before end"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistent reservation store.
///
/// Implementations must make `insert_reservation` and `reschedule_reservation`
/// atomic with respect to the no-overlap invariant: of two racing writes for
/// overlapping slots on the same venue and date, exactly one succeeds and the
/// other gets `UniqueConstraintViolation`.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// All reservations for the venue on that date, ordered by start.
    async fn list_reservations(
        &self,
        venue_id: Ulid,
        date: &DayKey,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Persist a draft, assigning its id and creation timestamp.
    async fn insert_reservation(
        &self,
        draft: ReservationDraft,
        owner: OwnerId,
    ) -> Result<Reservation, StoreError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Reservation, StoreError>;

    /// Remove a reservation, returning what was removed.
    async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, StoreError>;

    /// Move a reservation to a new date/slot on the same venue.
    async fn reschedule_reservation(
        &self,
        id: Ulid,
        date: DayKey,
        slot: Slot,
    ) -> Result<Reservation, StoreError>;
}

use ulid::Ulid;

use crate::model::Slot;
use crate::store::StoreError;

/// Typed outcome of a failed booking operation. Nothing here is ever retried
/// internally; `Conflict` in particular is terminal for the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// `start >= end`. Raised before the store is touched.
    InvalidRange(Slot),
    /// A required field is missing or over its limit.
    Validation(&'static str),
    /// No caller identity was supplied.
    Unauthenticated,
    NotOwner(Ulid),
    NotFound(Ulid),
    UnknownVenue(Ulid),
    /// The slot overlaps a committed reservation. Nothing was written.
    Conflict { conflicting: Ulid },
    /// The store could not be reached. Nothing was written; safe to retry.
    StoreUnavailable(String),
}

impl BookingError {
    /// Stable machine-readable name, used in responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidRange(_) => "invalid_range",
            BookingError::Validation(_) => "validation",
            BookingError::Unauthenticated => "unauthenticated",
            BookingError::NotOwner(_) => "not_owner",
            BookingError::NotFound(_) => "not_found",
            BookingError::UnknownVenue(_) => "unknown_venue",
            BookingError::Conflict { .. } => "conflict",
            BookingError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidRange(slot) => {
                write!(f, "invalid range {slot}: start must be before end")
            }
            BookingError::Validation(msg) => write!(f, "invalid booking: {msg}"),
            BookingError::Unauthenticated => write!(f, "sign in to book a venue"),
            BookingError::NotOwner(id) => write!(f, "reservation {id} belongs to another user"),
            BookingError::NotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::UnknownVenue(id) => write!(f, "unknown venue: {id}"),
            BookingError::Conflict { conflicting } => write!(
                f,
                "venue is already booked for the selected date and time (reservation {conflicting})"
            ),
            BookingError::StoreUnavailable(e) => write!(f, "reservation store unavailable: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueConstraintViolation { conflicting } => {
                BookingError::Conflict { conflicting }
            }
            StoreError::UnknownVenue(id) => BookingError::UnknownVenue(id),
            StoreError::NotFound(id) => BookingError::NotFound(id),
            StoreError::InvalidSlot(slot) => BookingError::InvalidRange(slot),
            StoreError::LimitExceeded(msg) => BookingError::Validation(msg),
            StoreError::Unavailable(e) => BookingError::StoreUnavailable(e),
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for creation timestamps.
pub type Ms = i64;

/// Minutes in a calendar day. `24:00` is the only valid time at this value.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidTime(String),
    InvalidDate(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidTime(s) => write!(f, "invalid time of day {s:?}, expected HH:MM"),
            ParseError::InvalidDate(s) => write!(f, "invalid date {s:?}, expected YYYY-MM-DD"),
        }
    }
}

impl std::error::Error for ParseError {}

fn two_digits(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some(u16::from(a - b'0') * 10 + u16::from(b - b'0'))
        }
        _ => None,
    }
}

/// Wall-clock time on a calendar day, stored as minutes since midnight.
///
/// Ordering matches the lexicographic ordering of the zero-padded `HH:MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour.checked_mul(60)?.checked_add(minute)?)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let err = || ParseError::InvalidTime(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(err());
        }
        let hour = two_digits(&bytes[0..2]).ok_or_else(err)?;
        let minute = two_digits(&bytes[3..5]).ok_or_else(err)?;
        Self::hm(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// Calendar day key in `YYYY-MM-DD` form. Opaque: only its shape is checked,
/// no calendar or timezone arithmetic is done on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(String);

impl DayKey {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let err = || ParseError::InvalidDate(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(err());
        }
        if !bytes[0..4].iter().all(u8::is_ascii_digit) {
            return Err(err());
        }
        let month = two_digits(&bytes[5..7]).ok_or_else(err)?;
        let day = two_digits(&bytes[8..10]).ok_or_else(err)?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(err());
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DayKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DayKey {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DayKey> for String {
    fn from(d: DayKey) -> Self {
        d.0
    }
}

/// Half-open interval `[start, end)` on a single day.
///
/// Construction does not enforce `start < end`; candidates coming from callers
/// are checked with [`Slot::is_valid`] before they reach any overlap logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Slot {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// The whole calendar day, `[00:00, 24:00)`.
    pub fn whole_day() -> Self {
        Self::new(TimeOfDay::MIDNIGHT, TimeOfDay::END_OF_DAY)
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Identity of the user a reservation is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub description: String,
}

/// A proposed reservation, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub venue_id: Ulid,
    pub date: DayKey,
    #[serde(flatten)]
    pub slot: Slot,
    pub title: String,
    pub description: String,
    pub registration_link: String,
}

/// A committed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub date: DayKey,
    pub slot: Slot,
    pub title: String,
    pub description: String,
    pub registration_link: String,
    pub owner: OwnerId,
    pub created_at: Ms,
}

/// Key of the per-day reservation index: one venue on one date.
pub type DayId = (Ulid, DayKey);

/// All reservations for one venue on one date.
#[derive(Debug, Clone)]
pub struct DayState {
    pub venue_id: Ulid,
    pub date: DayKey,
    /// Sorted by `slot.start`.
    pub reservations: Vec<Reservation>,
}

impl DayState {
    pub fn new(venue_id: Ulid, date: DayKey) -> Self {
        Self {
            venue_id,
            date,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by slot.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.slot.start, |r| r.slot.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Reservations whose slot overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Slot) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.slot.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.slot.end > query.start)
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.reservations.iter().map(|r| r.slot).collect()
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCommitted {
        reservation: Reservation,
    },
    ReservationRescheduled {
        id: Ulid,
        venue_id: Ulid,
        from_date: DayKey,
        date: DayKey,
        slot: Slot,
    },
    ReservationCancelled {
        id: Ulid,
        venue_id: Ulid,
        date: DayKey,
    },
}

impl Event {
    pub fn venue_id(&self) -> Ulid {
        match self {
            Event::ReservationCommitted { reservation } => reservation.venue_id,
            Event::ReservationRescheduled { venue_id, .. }
            | Event::ReservationCancelled { venue_id, .. } => *venue_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    fn slot(a: &str, b: &str) -> Slot {
        Slot::new(t(a), t(b))
    }

    fn reservation(a: &str, b: &str) -> Reservation {
        Reservation {
            id: Ulid::new(),
            venue_id: Ulid::nil(),
            date: DayKey::parse("2025-03-01").unwrap(),
            slot: slot(a, b),
            title: "Meetup".into(),
            description: String::new(),
            registration_link: String::new(),
            owner: OwnerId::new("u1"),
            created_at: 0,
        }
    }

    #[test]
    fn time_of_day_parse_and_display() {
        assert_eq!(t("09:05").minutes(), 9 * 60 + 5);
        assert_eq!(t("00:00"), TimeOfDay::MIDNIGHT);
        assert_eq!(t("24:00"), TimeOfDay::END_OF_DAY);
        assert_eq!(t("14:30").to_string(), "14:30");
    }

    #[test]
    fn time_of_day_rejects_bad_input() {
        for bad in ["9:00", "09:60", "24:01", "25:00", "ab:cd", "09-00", "", "09:00:00"] {
            assert!(TimeOfDay::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn time_order_matches_lexicographic_order() {
        let mut raw = vec!["13:00", "09:30", "00:15", "09:05", "23:59"];
        let mut parsed: Vec<TimeOfDay> = raw.iter().map(|s| t(s)).collect();
        raw.sort();
        parsed.sort();
        let rendered: Vec<String> = parsed.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, raw);
    }

    #[test]
    fn day_key_shape() {
        assert!(DayKey::parse("2025-03-01").is_ok());
        assert!(DayKey::parse("2025-3-01").is_err());
        assert!(DayKey::parse("2025-13-01").is_err());
        assert!(DayKey::parse("2025-00-10").is_err());
        assert!(DayKey::parse("2025-01-32").is_err());
        assert!(DayKey::parse("20x5-01-02").is_err());
    }

    #[test]
    fn slot_overlap() {
        let a = slot("09:00", "10:00");
        let b = slot("09:30", "10:30");
        let c = slot("10:00", "11:00");
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn slot_validity() {
        assert!(slot("09:00", "10:00").is_valid());
        assert!(!slot("10:00", "10:00").is_valid());
        assert!(!slot("11:00", "10:00").is_valid());
    }

    #[test]
    fn slot_serializes_as_hh_mm() {
        let json = serde_json::to_string(&slot("09:00", "10:30")).unwrap();
        assert_eq!(json, r#"{"start":"09:00","end":"10:30"}"#);
        let bad: Result<Slot, _> = serde_json::from_str(r#"{"start":"9","end":"10:30"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn day_state_keeps_start_order() {
        let mut day = DayState::new(Ulid::nil(), DayKey::parse("2025-03-01").unwrap());
        day.insert_reservation(reservation("14:00", "15:00"));
        day.insert_reservation(reservation("09:00", "10:00"));
        day.insert_reservation(reservation("11:00", "12:00"));
        let starts: Vec<String> = day
            .reservations
            .iter()
            .map(|r| r.slot.start.to_string())
            .collect();
        assert_eq!(starts, vec!["09:00", "11:00", "14:00"]);
    }

    #[test]
    fn day_state_remove() {
        let mut day = DayState::new(Ulid::nil(), DayKey::parse("2025-03-01").unwrap());
        let r = reservation("09:00", "10:00");
        let id = r.id;
        day.insert_reservation(r);
        assert!(day.remove_reservation(Ulid::new()).is_none());
        assert_eq!(day.remove_reservation(id).map(|r| r.id), Some(id));
        assert!(day.reservations.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut day = DayState::new(Ulid::nil(), DayKey::parse("2025-03-01").unwrap());
        day.insert_reservation(reservation("08:00", "09:00"));
        day.insert_reservation(reservation("09:30", "11:00"));
        day.insert_reservation(reservation("13:00", "14:00"));
        let hits: Vec<_> = day.overlapping(&slot("10:00", "12:00")).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slot, slot("09:30", "11:00"));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut day = DayState::new(Ulid::nil(), DayKey::parse("2025-03-01").unwrap());
        day.insert_reservation(reservation("09:00", "10:00"));
        assert_eq!(day.overlapping(&slot("10:00", "11:00")).count(), 0);
        assert_eq!(day.overlapping(&slot("08:00", "09:00")).count(), 0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCommitted {
            reservation: reservation("09:00", "10:00"),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

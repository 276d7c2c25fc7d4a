mod availability;
mod conflict;
mod mutations;
mod queries;
mod store;

pub use availability::{
    SlotVerdict, evaluate, first_gap, free_slots, merge_overlapping, subtract_intervals,
};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::StoreError;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// make the whole batch durable with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Flush what we have before a compaction or counter read.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        flush_and_respond(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(batch = batch.len(), "WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let written = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    let Err(e) = written else {
        return Ok(());
    };
    // Every waiter is told the write failed, so none of the batch may survive.
    if let Err(discard) = wal.discard_unsynced() {
        tracing::error!(path = %wal.path().display(), "failed to discard rejected WAL batch: {discard}");
    }
    Err(e)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            flush_and_respond(wal, &mut vec![(event, response)]);
        }
    }
}

/// Rebuild the index from the log, before anything is shared.
fn replay_event(days: &mut HashMap<DayId, DayState>, index: &mut HashMap<Ulid, DayId>, event: &Event) {
    match event {
        Event::ReservationCommitted { reservation } => {
            let key = (reservation.venue_id, reservation.date.clone());
            let day = days
                .entry(key.clone())
                .or_insert_with(|| DayState::new(key.0, key.1.clone()));
            if let Some(existing) = day.overlapping(&reservation.slot).next() {
                tracing::warn!(
                    id = %reservation.id,
                    conflicting = %existing.id,
                    venue = %reservation.venue_id,
                    date = %reservation.date,
                    "skipping replayed reservation that overlaps an earlier one"
                );
                return;
            }
            day.insert_reservation(reservation.clone());
            index.insert(reservation.id, key);
        }
        Event::ReservationRescheduled {
            id,
            venue_id,
            from_date,
            date,
            slot,
        } => {
            let from_key = (*venue_id, from_date.clone());
            let key = (*venue_id, date.clone());
            let blocked = days.get(&key).and_then(|d| {
                d.overlapping(slot).find(|r| r.id != *id).map(|r| r.id)
            });
            if let Some(conflicting) = blocked {
                tracing::warn!(
                    %id,
                    %conflicting,
                    venue = %venue_id,
                    %date,
                    "skipping replayed reschedule that overlaps another reservation"
                );
                return;
            }
            let Some(mut reservation) = days
                .get_mut(&from_key)
                .and_then(|d| d.remove_reservation(*id))
            else {
                return;
            };
            reservation.date = date.clone();
            reservation.slot = *slot;
            days.entry(key.clone())
                .or_insert_with(|| DayState::new(*venue_id, date.clone()))
                .insert_reservation(reservation);
            index.insert(*id, key);
        }
        Event::ReservationCancelled { id, venue_id, date } => {
            if let Some(day) = days.get_mut(&(*venue_id, date.clone())) {
                day.remove_reservation(*id);
            }
            index.remove(id);
        }
    }
}

/// The reference reservation store.
///
/// Reservations are indexed per (venue, date), each day behind its own lock, so
/// writes to one day are serialised while unrelated days never contend. Every
/// mutation is appended to the WAL before it becomes visible.
pub struct Engine {
    days: DashMap<DayId, SharedDayState>,
    /// Read-only venue catalog.
    venues: DashMap<Ulid, Venue>,
    /// Reverse lookup: reservation id → the day holding it.
    reservation_days: DashMap<Ulid, DayId>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold this shared for the whole mutation; compaction takes it
    /// exclusively so no append lands in the old log after the snapshot.
    compaction_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, venues: Vec<Venue>, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut days = HashMap::new();
        let mut index = HashMap::new();
        for event in &events {
            replay_event(&mut days, &mut index, event);
        }
        info!(
            wal = %wal_path.display(),
            events = events.len(),
            reservations = index.len(),
            venues = venues.len(),
            "reservation log replayed"
        );

        Ok(Self {
            days: days
                .into_iter()
                .map(|(key, day)| (key, Arc::new(RwLock::new(day))))
                .collect(),
            venues: venues.into_iter().map(|v| (v.id, v)).collect(),
            reservation_days: index.into_iter().collect(),
            wal_tx,
            compaction_gate: RwLock::new(()),
            notify,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(format!("WAL write failed: {e}")))
    }

    fn day_handle(&self, key: &DayId) -> Option<SharedDayState> {
        self.days.get(key).map(|e| e.value().clone())
    }

    fn day_handle_or_create(&self, key: &DayId) -> SharedDayState {
        self.days
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key.0, key.1.clone()))))
            .value()
            .clone()
    }

    fn day_of(&self, reservation_id: &Ulid) -> Option<DayId> {
        self.reservation_days
            .get(reservation_id)
            .map(|e| e.value().clone())
    }

    /// Lookup reservation → day, acquire that day's write lock, and confirm the
    /// reservation is still there (it may have moved while we waited).
    async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<(DayId, OwnedRwLockWriteGuard<DayState>), StoreError> {
        loop {
            let key = self.day_of(id).ok_or(StoreError::NotFound(*id))?;
            let day = self.day_handle(&key).ok_or(StoreError::NotFound(*id))?;
            let guard = day.write_owned().await;
            if guard.reservations.iter().any(|r| r.id == *id) {
                return Ok((key, guard));
            }
        }
    }
}

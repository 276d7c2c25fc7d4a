use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::store::ReservationStore;

use super::{AvailabilityChecker, AvailabilityResult, BookingError, SlotQuery};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What a reactive caller should currently display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    /// Form incomplete; nothing to check.
    Idle,
    /// A check for `generation` is waiting out the debounce or running.
    Pending { generation: u64 },
    Ready {
        generation: u64,
        query: SlotQuery,
        result: Result<AvailabilityResult, BookingError>,
    },
}

impl CheckState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            CheckState::Idle => None,
            CheckState::Pending { generation } | CheckState::Ready { generation, .. } => {
                Some(*generation)
            }
        }
    }
}

/// Debounced, supersedable availability checks for callers that re-check on
/// every edit of venue, date, start or end.
///
/// Each proposal aborts the previous task. A result is only published while
/// its generation is still the latest, so a slow check that finishes after a
/// newer proposal is dropped instead of overwriting it.
pub struct AvailabilityWatch<S: ?Sized> {
    checker: AvailabilityChecker<S>,
    debounce: Duration,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<CheckState>>,
}

impl<S: ReservationStore + ?Sized + 'static> AvailabilityWatch<S> {
    pub fn new(checker: AvailabilityChecker<S>) -> Self {
        Self::with_debounce(checker, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(checker: AvailabilityChecker<S>, debounce: Duration) -> Self {
        let (state, _) = watch::channel(CheckState::Idle);
        Self {
            checker,
            debounce,
            generation: 0,
            in_flight: None,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> CheckState {
        self.state.borrow().clone()
    }

    /// Replace the pending check. Returns the new generation.
    pub fn propose(&mut self, query: Option<SlotQuery>) -> u64 {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.generation += 1;
        let generation = self.generation;

        let Some(query) = query else {
            self.state.send_replace(CheckState::Idle);
            return generation;
        };
        self.state.send_replace(CheckState::Pending { generation });

        let checker = self.checker.clone();
        let state = self.state.clone();
        let debounce = self.debounce;
        self.in_flight = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let result = checker
                .check_availability(query.venue_id, &query.date, query.slot)
                .await;
            let published = state.send_if_modified(|current| {
                if current.generation() != Some(generation) {
                    return false;
                }
                *current = CheckState::Ready {
                    generation,
                    query,
                    result,
                };
                true
            });
            if !published {
                debug!(generation, "superseded availability check discarded");
            }
        }));
        generation
    }
}

impl<S: ?Sized> Drop for AvailabilityWatch<S> {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

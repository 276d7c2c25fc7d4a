//! JSON-lines protocol: one request object per line, one response per line.
//!
//! ```text
//! {"op":"check","venue_id":"01J...","date":"2025-03-01","start":"14:00","end":"15:00"}
//! {"ok":true,"result":{"status":"available"}}
//! ```

use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, warn};
use ulid::Ulid;

use crate::booking::{BookingCommitter, BookingError, SlotQuery};
use crate::engine::Engine;
use crate::identity::IdentityProvider;
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::model::*;
use crate::observability::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS, request_label};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Venues,
    Check {
        #[serde(flatten)]
        query: SlotQuery,
    },
    Commit {
        #[serde(default)]
        token: Option<String>,
        #[serde(flatten)]
        draft: ReservationDraft,
    },
    Cancel {
        #[serde(default)]
        token: Option<String>,
        id: Ulid,
    },
    Reschedule {
        #[serde(default)]
        token: Option<String>,
        id: Ulid,
        date: DayKey,
        start: TimeOfDay,
        end: TimeOfDay,
    },
    /// Reservations on or after `from`, optionally for one venue.
    List {
        #[serde(default)]
        venue_id: Option<Ulid>,
        from: DayKey,
    },
    /// Unreserved time on a day, within `[start, end)` (whole day by default).
    FreeSlots {
        venue_id: Ulid,
        date: DayKey,
        #[serde(default)]
        start: Option<TimeOfDay>,
        #[serde(default)]
        end: Option<TimeOfDay>,
    },
    /// Reservation count per date on or after `from`.
    Density {
        #[serde(default)]
        venue_id: Option<Ulid>,
        from: DayKey,
    },
}

/// Why a request produced no result.
#[derive(Debug)]
enum Failure {
    Booking(BookingError),
    /// The result could not be encoded as JSON.
    Encode(serde_json::Error),
}

impl From<BookingError> for Failure {
    fn from(e: BookingError) -> Self {
        Failure::Booking(e)
    }
}

fn ok(result: Value) -> Value {
    json!({ "ok": true, "result": result })
}

fn error_body(kind: &str, message: String) -> Value {
    json!({ "ok": false, "error": { "kind": kind, "message": message } })
}

fn booking_error(e: &BookingError) -> Value {
    let mut body = error_body(e.kind(), e.to_string());
    if let BookingError::Conflict { conflicting } = e {
        body["error"]["conflicting"] = json!(conflicting);
    }
    body
}

fn failure_body(failure: &Failure) -> Value {
    match failure {
        Failure::Booking(e) => booking_error(e),
        Failure::Encode(e) => {
            error!("cannot encode response: {e}");
            error_body("internal", format!("cannot encode response: {e}"))
        }
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> Result<Value, Failure> {
    serde_json::to_value(v).map_err(Failure::Encode)
}

/// Request dispatch shared by every connection.
pub struct Server {
    engine: Arc<Engine>,
    committer: BookingCommitter<Engine>,
    identity: Arc<dyn IdentityProvider>,
}

impl Server {
    pub fn new(engine: Arc<Engine>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            committer: BookingCommitter::new(engine.clone()),
            engine,
            identity,
        }
    }

    fn owner(&self, token: Option<&str>) -> Option<OwnerId> {
        token.and_then(|t| self.identity.resolve(t))
    }

    fn known_venue(&self, id: Ulid) -> Result<(), BookingError> {
        match self.engine.get_venue(&id) {
            Some(_) => Ok(()),
            None => Err(BookingError::UnknownVenue(id)),
        }
    }

    /// Parse and execute one request line.
    pub async fn handle_line(&self, line: &str) -> Value {
        match serde_json::from_str::<Request>(line) {
            Ok(req) => self.handle(req).await,
            Err(e) => {
                metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "bad_request")
                    .increment(1);
                error_body("bad_request", format!("malformed request: {e}"))
            }
        }
    }

    pub async fn handle(&self, req: Request) -> Value {
        let op = request_label(&req);
        let started = Instant::now();
        let response = match self.execute(req).await {
            Ok(v) => ok(v),
            Err(failure) => failure_body(&failure),
        };
        let status = response["error"]["kind"].as_str().unwrap_or("ok").to_string();
        metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
        metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        response
    }

    async fn execute(&self, req: Request) -> Result<Value, Failure> {
        match req {
            Request::Venues => to_value(&self.engine.list_venues()),
            Request::Check { query } => {
                self.known_venue(query.venue_id)?;
                let result = self
                    .committer
                    .checker()
                    .check_availability(query.venue_id, &query.date, query.slot)
                    .await?;
                to_value(&result)
            }
            Request::Commit { token, draft } => {
                let owner = self.owner(token.as_deref());
                let reservation = self.committer.commit_booking(draft, owner).await?;
                to_value(&reservation)
            }
            Request::Cancel { token, id } => {
                let owner = self.owner(token.as_deref());
                let removed = self.committer.cancel_booking(id, owner).await?;
                to_value(&removed)
            }
            Request::Reschedule {
                token,
                id,
                date,
                start,
                end,
            } => {
                let owner = self.owner(token.as_deref());
                let moved = self
                    .committer
                    .reschedule_booking(id, date, Slot::new(start, end), owner)
                    .await?;
                to_value(&moved)
            }
            Request::List { venue_id, from } => {
                if let Some(v) = venue_id {
                    self.known_venue(v)?;
                }
                to_value(&self.engine.upcoming(&from, venue_id).await)
            }
            Request::FreeSlots {
                venue_id,
                date,
                start,
                end,
            } => {
                self.known_venue(venue_id)?;
                let window = Slot::new(
                    start.unwrap_or(TimeOfDay::MIDNIGHT),
                    end.unwrap_or(TimeOfDay::END_OF_DAY),
                );
                if !window.is_valid() {
                    return Err(BookingError::InvalidRange(window).into());
                }
                to_value(&self.engine.free_slots(venue_id, &date, window).await)
            }
            Request::Density { venue_id, from } => {
                if let Some(v) = venue_id {
                    self.known_venue(v)?;
                }
                to_value(&self.engine.density(&from, venue_id).await)
            }
        }
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(socket: TcpStream, server: Arc<Server>) -> io::Result<()> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("request line over {MAX_REQUEST_LINE_LEN} bytes, closing connection");
                let body = error_body("bad_request", "request line too long".into());
                let _ = framed.send(body.to_string()).await;
                return Ok(());
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = server.handle_line(&line).await;
        framed.send(response.to_string()).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        })?;
    }
    debug!("client disconnected");
    Ok(())
}

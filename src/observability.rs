use std::net::SocketAddr;

use crate::server::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "venuebook_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "venuebook_request_duration_seconds";

/// Counter: availability checks. Labels: outcome (available, conflict, error).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "venuebook_availability_checks_total";

pub const AVAILABILITY_CHECK_DURATION_SECONDS: &str =
    "venuebook_availability_check_duration_seconds";

/// Counter: booking writes. Labels: op (commit, cancel, reschedule), status.
pub const BOOKING_WRITES_TOTAL: &str = "venuebook_booking_writes_total";

/// Histogram: end-to-end commit latency including the re-check.
pub const BOOKING_COMMIT_DURATION_SECONDS: &str = "venuebook_booking_commit_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "venuebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "venuebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "venuebook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venuebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "venuebook_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "venuebook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a request to a short label for metrics.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::Venues => "venues",
        Request::Check { .. } => "check",
        Request::Commit { .. } => "commit",
        Request::Cancel { .. } => "cancel",
        Request::Reschedule { .. } => "reschedule",
        Request::List { .. } => "list",
        Request::FreeSlots { .. } => "free_slots",
        Request::Density { .. } => "density",
    }
}

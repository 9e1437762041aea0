use std::net::SocketAddr;

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: booking requests. Labels: outcome.
pub const BOOKING_REQUESTS_TOTAL: &str = "lodgebook_booking_requests_total";

/// Counter: status transitions. Labels: to, outcome.
pub const STATUS_TRANSITIONS_TOTAL: &str = "lodgebook_status_transitions_total";

/// Histogram: submit_booking_request latency in seconds.
pub const SUBMIT_DURATION_SECONDS: &str = "lodgebook_submit_duration_seconds";

/// Counter: notifications that could not be delivered to the notifier.
pub const NOTIFY_FAILURES_TOTAL: &str = "lodgebook_notify_failures_total";

// ── Race mitigation ─────────────────────────────────────────────

/// Counter: conflicts rejected inside a guarded insert after the pre-check passed.
pub const GUARDED_INSERT_CONFLICTS_TOTAL: &str = "lodgebook_guarded_insert_conflicts_total";

/// Counter: bookings flagged by reconciliation as overlapping an earlier one.
pub const RECONCILE_FLAGGED_TOTAL: &str = "lodgebook_reconcile_flagged_total";

/// Gauge: properties waiting for a background reconciliation pass.
pub const RECONCILE_DIRTY_PROPERTIES: &str = "lodgebook_reconcile_dirty_properties";

// ── Store ───────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lodgebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lodgebook_wal_flush_batch_size";

/// Install the fmt tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
